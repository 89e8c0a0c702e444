//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TrailSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `TRAIL_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};
use trail_core::CreationPolicy;

use crate::errors::{Result, SettingsError};
use crate::types::TrailSettings;

/// Env var naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "TRAIL_SETTINGS_PATH";

/// Resolve the settings file: `$TRAIL_SETTINGS_PATH`, else `~/.trail/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = read_env_string(SETTINGS_PATH_ENV) {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".trail").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TrailSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TrailSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<TrailSettings> {
    let defaults = serde_json::to_value(TrailSettings::default()).map_err(SettingsError::Schema)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(SettingsError::Schema)
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

/// Apply `TRAIL_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut TrailSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// | Variable | Field |
/// |---|---|
/// | `TRAIL_CREATION_POLICY` | `creation_policy` |
/// | `TRAIL_AUDIT_DISABLED` | `audit_disabled` |
/// | `TRAIL_LOG_LEVEL` | `logging.level` |
/// | `TRAIL_LOG_JSON` | `logging.json` |
///
/// Invalid values are ignored with a warning.
pub fn apply_overrides(settings: &mut TrailSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(raw) = read("TRAIL_CREATION_POLICY") {
        match raw.parse::<CreationPolicy>() {
            Ok(policy) => settings.creation_policy = policy,
            Err(err) => warn!(key = "TRAIL_CREATION_POLICY", value = %raw, %err, "ignoring env var"),
        }
    }
    if let Some(raw) = read("TRAIL_AUDIT_DISABLED") {
        match parse_bool(&raw) {
            Some(v) => settings.audit_disabled = v,
            None => warn!(key = "TRAIL_AUDIT_DISABLED", value = %raw, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(raw) = read("TRAIL_LOG_LEVEL") {
        settings.logging.level = raw;
    }
    if let Some(raw) = read("TRAIL_LOG_JSON") {
        match parse_bool(&raw) {
            Some(v) => settings.logging.json = v,
            None => warn!(key = "TRAIL_LOG_JSON", value = %raw, "invalid boolean env var, ignoring"),
        }
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
