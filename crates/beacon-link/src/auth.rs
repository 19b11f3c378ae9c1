//! Bearer credentials and the providers that supply them.
//!
//! A credential is resolved through a [`CredentialProvider`] on every connect
//! and reconnect attempt, so rotated tokens are picked up without rebuilding
//! the connection. JWT payloads are decoded without signature verification,
//! only to read `exp`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::errors::AuthError;

/// Opaque bearer token plus optional expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthCredential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthCredential {
    /// Credential with an explicit expiry.
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Parse a token, reading `exp` when it is a JWT.
    ///
    /// Tokens without three dot-separated segments are treated as opaque and
    /// never expire. A three-segment token whose payload cannot be decoded is
    /// rejected.
    pub fn from_token(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AuthError::Missing);
        }
        let expires_at = if token.split('.').count() == 3 {
            jwt_expiry(&token)?
        } else {
            None
        };
        Ok(Self { token, expires_at })
    }

    /// The raw bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Expiry, when known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the credential is unusable at `now`, treating anything
    /// expiring within `leeway` as already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        match (expires_at - now).to_std() {
            Ok(remaining) => remaining.is_zero() || remaining <= leeway,
            Err(_) => true,
        }
    }

    /// Fail with [`AuthError::Expired`] if the credential is unusable now.
    pub fn ensure_valid(&self, leeway: Duration) -> Result<(), AuthError> {
        match self.expires_at {
            Some(expired_at) if self.is_expired_at(Utc::now(), leeway) => {
                Err(AuthError::Expired { expired_at })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn jwt_expiry(token: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::Malformed("missing payload segment".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::Malformed(format!("payload is not base64url: {e}")))?;
    let claims: Value = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::Malformed(format!("payload is not JSON: {e}")))?;

    let exp = match claims.get("exp") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            // Fractional seconds are truncated.
            .or_else(|| n.as_f64().map(|f| f as i64)),
        Some(_) => None,
    }
    .ok_or_else(|| AuthError::Malformed("exp is not a number".into()))?;

    DateTime::from_timestamp(exp, 0)
        .map(Some)
        .ok_or_else(|| AuthError::Malformed(format!("exp out of range: {exp}")))
}

/// Supplies a credential for each connection attempt.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve the credential to present, or `None` when there is none.
    async fn credential(&self) -> Result<Option<AuthCredential>, AuthError>;
}

/// Provider that always returns the same credential.
#[derive(Clone, Debug, Default)]
pub struct StaticCredential(Option<AuthCredential>);

impl StaticCredential {
    /// Wrap a fixed credential.
    pub fn new(credential: AuthCredential) -> Self {
        Self(Some(credential))
    }

    /// Provider that never has a credential.
    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(&self) -> Result<Option<AuthCredential>, AuthError> {
        Ok(self.0.clone())
    }
}

/// Provider whose credential can be replaced at runtime.
///
/// Clones share the same slot, so a token refresher can hold one clone while
/// the connection holds another.
#[derive(Clone, Debug, Default)]
pub struct SharedCredential {
    slot: Arc<RwLock<Option<AuthCredential>>>,
}

impl SharedCredential {
    /// Provider seeded with `credential`.
    pub fn new(credential: Option<AuthCredential>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(credential)),
        }
    }

    /// Replace the credential used by the next attempt.
    pub fn set(&self, credential: AuthCredential) {
        *self.slot.write() = Some(credential);
    }

    /// Remove the credential.
    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    /// Current credential.
    pub fn get(&self) -> Option<AuthCredential> {
        self.slot.read().clone()
    }
}

#[async_trait]
impl CredentialProvider for SharedCredential {
    async fn credential(&self) -> Result<Option<AuthCredential>, AuthError> {
        Ok(self.get())
    }
}

/// Resolve a credential from `provider` and check it is usable.
pub async fn resolve_credential(
    provider: &dyn CredentialProvider,
    leeway: Duration,
) -> Result<AuthCredential, AuthError> {
    let credential = provider.credential().await?.ok_or(AuthError::Missing)?;
    credential.ensure_valid(leeway)?;
    Ok(credential)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
