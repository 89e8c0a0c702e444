//! Save policy for audit scopes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// When, and how many times, a scope hands its event to the provider.
///
/// | Policy | On begin | On end |
/// |---|---|---|
/// | `InsertOnEnd` | - | insert |
/// | `InsertOnStartReplaceOnEnd` | insert | update (same id) |
/// | `InsertOnStartInsertOnEnd` | insert | insert (second record) |
/// | `Manual` | - | - (caller saves) |
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CreationPolicy {
    /// Single insert when the scope ends.
    #[default]
    InsertOnEnd,
    /// Insert a partial event at begin, replace it at end.
    InsertOnStartReplaceOnEnd,
    /// Insert a partial event at begin and an independent final event at end.
    InsertOnStartInsertOnEnd,
    /// Nothing automatic; the caller persists through explicit saves.
    Manual,
}

impl CreationPolicy {
    /// All policies, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::InsertOnEnd,
        Self::InsertOnStartReplaceOnEnd,
        Self::InsertOnStartInsertOnEnd,
        Self::Manual,
    ];

    /// Whether the policy persists a partial event when the scope begins.
    #[must_use]
    pub const fn inserts_on_start(self) -> bool {
        matches!(
            self,
            Self::InsertOnStartReplaceOnEnd | Self::InsertOnStartInsertOnEnd
        )
    }

    /// Whether the policy persists automatically when the scope ends.
    #[must_use]
    pub const fn saves_on_end(self) -> bool {
        !matches!(self, Self::Manual)
    }

    /// Stable kebab-case name used by settings and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsertOnEnd => "insert-on-end",
            Self::InsertOnStartReplaceOnEnd => "insert-on-start-replace-on-end",
            Self::InsertOnStartInsertOnEnd => "insert-on-start-insert-on-end",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for CreationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown creation policy: {0}")]
pub struct ParsePolicyError(pub String);

impl FromStr for CreationPolicy {
    type Err = ParsePolicyError;

    /// Accepts kebab-case, snake_case, camelCase and PascalCase spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "insertonend" => Ok(Self::InsertOnEnd),
            "insertonstartreplaceonend" => Ok(Self::InsertOnStartReplaceOnEnd),
            "insertonstartinsertonend" => Ok(Self::InsertOnStartInsertOnEnd),
            "manual" => Ok(Self::Manual),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_insert_on_end() {
        assert_eq!(CreationPolicy::default(), CreationPolicy::InsertOnEnd);
    }

    #[test]
    fn start_and_end_classification() {
        let starting: Vec<_> = CreationPolicy::ALL
            .iter()
            .filter(|p| p.inserts_on_start())
            .collect();
        assert_eq!(starting.len(), 2);
        assert!(!CreationPolicy::Manual.saves_on_end());
        assert!(CreationPolicy::InsertOnStartInsertOnEnd.saves_on_end());
    }

    #[test]
    fn parses_every_spelling() {
        for policy in CreationPolicy::ALL {
            assert_eq!(policy.as_str().parse::<CreationPolicy>().unwrap(), policy);
        }
        assert_eq!(
            "insert_on_start_replace_on_end".parse::<CreationPolicy>().unwrap(),
            CreationPolicy::InsertOnStartReplaceOnEnd
        );
        assert_eq!(
            "InsertOnStartInsertOnEnd".parse::<CreationPolicy>().unwrap(),
            CreationPolicy::InsertOnStartInsertOnEnd
        );
    }

    #[test]
    fn rejects_unknown_name() {
        let err = "sometimes".parse::<CreationPolicy>().unwrap_err();
        assert_eq!(err.to_string(), "unknown creation policy: sometimes");
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_string(&CreationPolicy::InsertOnStartReplaceOnEnd).unwrap();
        assert_eq!(json, r#""insertOnStartReplaceOnEnd""#);
    }
}
