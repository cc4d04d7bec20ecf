//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::PalaverSettings;

/// Resolve the path to the settings file (`~/.palaver/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".palaver").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PalaverSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PalaverSettings> {
    let defaults = serde_json::to_value(PalaverSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PalaverSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
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

/// Apply `PALAVER_*` overrides read through `lookup`.
///
/// Invalid values are logged and ignored.
pub fn apply_env_overrides<F>(settings: &mut PalaverSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("PALAVER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("PALAVER_PORT").and_then(|v| parse_in_range(&v, "PALAVER_PORT", 0, u16::MAX)) {
        settings.server.port = v;
    }
    if let Some(v) = read("PALAVER_HEARTBEAT_SECS")
        .and_then(|v| parse_in_range(&v, "PALAVER_HEARTBEAT_SECS", 0, 3_600))
    {
        settings.server.heartbeat_interval_secs = v;
    }

    // ── Database ────────────────────────────────────────────────────
    if let Some(v) = read("PALAVER_DB_PATH") {
        settings.database.path = v;
    }

    // ── Auth / logging ──────────────────────────────────────────────
    if let Some(v) = read("PALAVER_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = read("PALAVER_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Parse a number and check it lies within `min..=max`.
pub fn parse_in_range<T>(val: &str, key: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let parsed = val.parse::<T>().ok().filter(|n| *n >= min && *n <= max);
    if parsed.is_none() {
        tracing::warn!(key, value = %val, "invalid numeric env var, ignoring");
    }
    parsed
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn deep_merge_overrides_nested_keys() {
        let merged = deep_merge(
            json!({"server": {"host": "a", "port": 1}}),
            json!({"server": {"port": 2}}),
        );
        assert_eq!(merged, json!({"server": {"host": "a", "port": 2}}));
    }

    #[test]
    fn deep_merge_skips_nulls() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged, json!({"a": 1}));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.server, PalaverSettings::default().server);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"database":{"path":"/var/lib/chat.db"}}"#).unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.database.path, "/var/lib/chat.db");
        assert_eq!(settings.database.pool_size, 8);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = PalaverSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("PALAVER_PORT", "9100"),
                ("PALAVER_JWT_SECRET", "k"),
                ("PALAVER_HEARTBEAT_SECS", "0"),
            ]),
        );
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.auth.jwt_secret, "k");
        assert_eq!(settings.server.heartbeat_interval_secs, 0);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = PalaverSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[("PALAVER_PORT", "eighty"), ("PALAVER_HOST", "")]),
        );
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "127.0.0.1");
    }

    #[test]
    fn parse_in_range_bounds() {
        assert_eq!(parse_in_range::<u64>("10", "K", 0, 10), Some(10));
        assert_eq!(parse_in_range::<u64>("11", "K", 0, 10), None);
    }
}
