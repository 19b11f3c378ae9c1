//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BeaconSettings::default()`]
//! 2. If `~/.beacon/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `BEACON_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::BeaconSettings;

/// Resolve the path to the settings file (`~/.beacon/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".beacon").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<BeaconSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or invalid values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<BeaconSettings> {
    let defaults = serde_json::to_value(BeaconSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: BeaconSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject settings the runtime cannot operate with.
pub fn validate(settings: &BeaconSettings) -> Result<()> {
    let url = &settings.connection.url;
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(SettingsError::invalid(
            "connection.url",
            format!("must be a ws:// or wss:// URL, got {url:?}"),
        ));
    }
    if settings.engine.workers == 0 {
        return Err(SettingsError::invalid("engine.workers", "must be at least 1"));
    }
    if settings.engine.queue_capacity == 0 {
        return Err(SettingsError::invalid("engine.queueCapacity", "must be at least 1"));
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut BeaconSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using an arbitrary variable lookup.
///
/// Each variable has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (fall back to file/default)
pub fn apply_overrides_from(settings: &mut BeaconSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = env.string("BEACON_URL") {
        settings.connection.url = v;
    }
    if let Some(v) = env.u64("BEACON_INVOCATION_TIMEOUT_MS", 100, 3_600_000) {
        settings.connection.invocation_timeout_ms = v;
    }
    if let Some(v) = env.u64("BEACON_KEEPALIVE_INTERVAL_MS", 0, 3_600_000) {
        settings.connection.keepalive_interval_ms = v;
    }
    if let Some(v) = env.u64("BEACON_TOKEN_LEEWAY_MS", 0, 3_600_000) {
        settings.connection.token_leeway_ms = v;
    }

    // ── Reconnect policy ────────────────────────────────────────────
    if let Some(v) = env.u64("BEACON_RECONNECT_MAX_ATTEMPTS", 0, 1000) {
        #[allow(clippy::cast_possible_truncation)]
        let attempts = v as u32;
        settings.connection.reconnect.max_attempts = attempts;
    }
    if let Some(v) = env.u64("BEACON_RECONNECT_BASE_DELAY_MS", 1, 600_000) {
        settings.connection.reconnect.base_delay_ms = v;
    }
    if let Some(v) = env.u64("BEACON_RECONNECT_CAP_DELAY_MS", 1, 3_600_000) {
        settings.connection.reconnect.cap_delay_ms = v;
    }
    if let Some(v) = env.u64("BEACON_RECONNECT_JITTER_MAX_MS", 0, 600_000) {
        settings.connection.reconnect.jitter_max_ms = v;
    }

    // ── Engine ──────────────────────────────────────────────────────
    if let Some(v) = env.usize("BEACON_ENGINE_WORKERS", 1, 1024) {
        settings.engine.workers = v;
    }
    if let Some(v) = env.usize("BEACON_ENGINE_QUEUE_CAPACITY", 1, 1_000_000) {
        settings.engine.queue_capacity = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("BEACON_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("BEACON_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"connection": {"url": "ws://a", "keepaliveIntervalMs": 1}});
        let source = serde_json::json!({"connection": {"url": "ws://b"}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["connection"]["url"], "ws://b");
        assert_eq!(merged["connection"]["keepaliveIntervalMs"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.version, BeaconSettings::default().version);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"connection": {"reconnect": {"maxAttempts": 9}}, "engine": {"workers": 3}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.connection.reconnect.max_attempts, 9);
        assert_eq!(settings.connection.reconnect.base_delay_ms, 1000);
        assert_eq!(settings.engine.workers, 3);
        assert_eq!(settings.engine.queue_capacity, 256);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        let err = result.unwrap_err();
        assert!(matches!(&err, SettingsError::Malformed { path: p, .. } if *p == path));
        assert_eq!(err.code(), crate::errors::SETTINGS_MALFORMED);
    }

    #[test]
    fn load_rejects_zero_workers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"engine": {"workers": 0}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(
            result.unwrap_err(),
            SettingsError::Invalid { field: "engine.workers", .. }
        ));
    }

    #[test]
    fn load_rejects_mistyped_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"engine": {"workers": "many"}}"#).unwrap();

        let err = load_settings_from_path(&path).unwrap_err();
        assert_eq!(err.code(), crate::errors::SETTINGS_MISTYPED);
    }

    // ── validate ────────────────────────────────────────────────────

    #[test]
    fn validate_rejects_http_url() {
        let mut settings = BeaconSettings::default();
        settings.connection.url = "http://example.com".to_string();
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(validate(&BeaconSettings::default()).is_ok());
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply_valid_values() {
        let mut settings = BeaconSettings::default();
        apply_overrides_from(
            &mut settings,
            lookup_from(&[
                ("BEACON_URL", "wss://hub.example.com/analytics"),
                ("BEACON_RECONNECT_MAX_ATTEMPTS", "2"),
                ("BEACON_ENGINE_WORKERS", "8"),
                ("BEACON_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.connection.url, "wss://hub.example.com/analytics");
        assert_eq!(settings.connection.reconnect.max_attempts, 2);
        assert_eq!(settings.engine.workers, 8);
        assert!(settings.logging.json);
    }

    #[test]
    fn overrides_ignore_invalid_values() {
        let mut settings = BeaconSettings::default();
        apply_overrides_from(
            &mut settings,
            lookup_from(&[
                ("BEACON_ENGINE_WORKERS", "0"),
                ("BEACON_INVOCATION_TIMEOUT_MS", "abc"),
                ("BEACON_LOG_JSON", "maybe"),
                ("BEACON_URL", ""),
            ]),
        );
        let defaults = BeaconSettings::default();
        assert_eq!(settings.engine.workers, defaults.engine.workers);
        assert_eq!(settings.connection.invocation_timeout_ms, 30_000);
        assert!(!settings.logging.json);
        assert_eq!(settings.connection.url, defaults.connection.url);
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("50", 1, 100), Some(50));
        assert_eq!(parse_u64_range("500", 1, 100), None);
        assert_eq!(parse_usize_range("-1", 0, 10), None);
    }
}
