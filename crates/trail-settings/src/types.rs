//! Settings types.

use serde::{Deserialize, Serialize};
use trail_core::CreationPolicy;

/// Top-level settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrailSettings {
    /// Policy used by scopes that do not name one.
    pub creation_policy: CreationPolicy,
    /// When set, scopes are inert: no snapshots, hooks or provider calls.
    pub audit_disabled: bool,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for TrailSettings {
    fn default() -> Self {
        Self {
            creation_policy: CreationPolicy::InsertOnEnd,
            audit_disabled: false,
            logging: LoggingSettings::default(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (`RUST_LOG` still wins).
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = TrailSettings::default();
        assert_eq!(settings.creation_policy, CreationPolicy::InsertOnEnd);
        assert!(!settings.audit_disabled);
        assert_eq!(settings.logging.level, "warn");
        assert!(!settings.logging.json);
    }

    #[test]
    fn camel_case_keys() {
        let value = serde_json::to_value(TrailSettings::default()).unwrap();
        assert_eq!(value["creationPolicy"], "insertOnEnd");
        assert_eq!(value["auditDisabled"], false);
        assert_eq!(value["logging"]["level"], "warn");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: TrailSettings =
            serde_json::from_str(r#"{"creationPolicy": "manual"}"#).unwrap();
        assert_eq!(settings.creation_policy, CreationPolicy::Manual);
        assert_eq!(settings.logging, LoggingSettings::default());
    }
}
