//! Why a settings load was refused.

use std::path::PathBuf;

// ── Error code constants ────────────────────────────────────────────

/// The settings file exists but could not be read.
pub const SETTINGS_UNREADABLE: &str = "SETTINGS_UNREADABLE";
/// The settings file is not JSON.
pub const SETTINGS_MALFORMED: &str = "SETTINGS_MALFORMED";
/// The merged settings do not fit the settings schema.
pub const SETTINGS_MISTYPED: &str = "SETTINGS_MISTYPED";
/// A value is well-typed but unusable.
pub const SETTINGS_INVALID: &str = "SETTINGS_INVALID";

/// Failure to produce a usable [`BeaconSettings`](crate::BeaconSettings).
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Reading the settings file failed.
    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The settings file holds invalid JSON.
    #[error("{} is not valid JSON: {source}", .path.display())]
    Malformed {
        /// File that was parsed.
        path: PathBuf,
        /// Parser failure, with line and column.
        source: serde_json::Error,
    },

    /// A field has the wrong type, e.g. a string where a count belongs.
    #[error("settings do not match the expected shape: {0}")]
    Mistyped(#[from] serde_json::Error),

    /// A field is out of range for the runtime.
    #[error("{field}: {reason}")]
    Invalid {
        /// Dotted settings key, as written in the file.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreadable { .. } => SETTINGS_UNREADABLE,
            Self::Malformed { .. } => SETTINGS_MALFORMED,
            Self::Mistyped(_) => SETTINGS_MISTYPED,
            Self::Invalid { .. } => SETTINGS_INVALID,
        }
    }

    /// An [`Invalid`](Self::Invalid) for `field`.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
