//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may contain any subset of fields; missing fields keep their
//! compiled defaults.

use std::time::Duration;

use beacon_core::ReconnectPolicy;
use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "connection": { "url": "wss://analytics.example.com/hubs/analytics" },
///   "engine": { "workers": 4 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeaconSettings {
    /// Settings schema version.
    pub version: String,
    /// Hub connection settings.
    pub connection: ConnectionSettings,
    /// Processing engine settings.
    pub engine: EngineSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for BeaconSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            connection: ConnectionSettings::default(),
            engine: EngineSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Hub connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// WebSocket endpoint of the hub.
    pub url: String,
    /// Pending invocations older than this are rejected, in ms.
    pub invocation_timeout_ms: u64,
    /// Interval between keepalive pings while connected, in ms (0 disables).
    pub keepalive_interval_ms: u64,
    /// Tokens expiring within this window are treated as expired, in ms.
    pub token_leeway_ms: u64,
    /// Automatic reconnect policy.
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:5000/hubs/analytics".to_string(),
            invocation_timeout_ms: 30_000,
            keepalive_interval_ms: 15_000,
            token_leeway_ms: 0,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ConnectionSettings {
    /// Invocation timeout as a [`Duration`].
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    /// Keepalive interval, `None` when disabled.
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_ms > 0).then(|| Duration::from_millis(self.keepalive_interval_ms))
    }

    /// Token expiry leeway as a [`Duration`].
    pub fn token_leeway(&self) -> Duration {
        Duration::from_millis(self.token_leeway_ms)
    }
}

/// Processing engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Maximum requests processed in parallel.
    pub workers: usize,
    /// Capacity of the submission queue.
    pub queue_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get),
            queue_capacity: 256,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level or filter directive.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = BeaconSettings::default();
        assert_eq!(settings.connection.invocation_timeout_ms, 30_000);
        assert_eq!(settings.connection.reconnect.max_attempts, 5);
        assert_eq!(settings.engine.queue_capacity, 256);
        assert!(settings.engine.workers >= 1);
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn camel_case_wire_names() {
        let json = serde_json::to_value(BeaconSettings::default()).unwrap();
        assert!(json["connection"]["invocationTimeoutMs"].is_u64());
        assert!(json["connection"]["reconnect"]["capDelayMs"].is_u64());
        assert!(json["engine"]["queueCapacity"].is_u64());
    }

    #[test]
    fn keepalive_zero_disables() {
        let settings = ConnectionSettings {
            keepalive_interval_ms: 0,
            ..ConnectionSettings::default()
        };
        assert!(settings.keepalive_interval().is_none());
    }

    #[test]
    fn partial_section_keeps_defaults() {
        let settings: BeaconSettings =
            serde_json::from_str(r#"{"connection": {"url": "ws://example"}}"#).unwrap();
        assert_eq!(settings.connection.url, "ws://example");
        assert_eq!(settings.connection.keepalive_interval_ms, 15_000);
    }
}
