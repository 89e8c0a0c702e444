//! Error types shared by the event model and provider contract.

use thiserror::Error;

use crate::ids::EventId;

/// Boxed error carried from backends and custom action handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A value could not be reduced to a structural snapshot.
#[derive(Debug, Error)]
#[error("cannot snapshot {subject}: {source}")]
pub struct SnapshotError {
    /// What was being captured (target type name or custom field key).
    pub subject: String,
    /// Underlying serializer failure.
    #[source]
    pub source: serde_json::Error,
}

/// A custom field tried to use a key owned by the event itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("custom field key '{0}' is reserved")]
pub struct ReservedKeyError(pub String);

/// Failure surfaced by an [`AuditProvider`](crate::provider::AuditProvider).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The backend failed while performing an operation.
    #[error("{operation} failed: {source}")]
    Backend {
        /// `"insert"` or `"update"`.
        operation: &'static str,
        /// The backend's own error.
        #[source]
        source: BoxError,
    },

    /// `update` referenced a record the backend does not know.
    #[error("audit record not found: {0}")]
    NotFound(EventId),

    /// The backend refused the call without attempting it.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Wrap a backend error raised during insert.
    pub fn insert(source: impl Into<BoxError>) -> Self {
        Self::Backend {
            operation: "insert",
            source: source.into(),
        }
    }

    /// Wrap a backend error raised during update.
    pub fn update(source: impl Into<BoxError>) -> Self {
        Self::Backend {
            operation: "update",
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn backend_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = ProviderError::insert(io);
        assert_eq!(err.to_string(), "insert failed: pipe closed");
        assert!(err.source().is_some());
    }

    #[test]
    fn update_error_from_message() {
        let err = ProviderError::update("disk full");
        assert_eq!(err.to_string(), "update failed: disk full");
    }

    #[test]
    fn not_found_display() {
        let err = ProviderError::NotFound(EventId::from("evt-9"));
        assert_eq!(err.to_string(), "audit record not found: evt-9");
    }

    #[test]
    fn reserved_key_display() {
        let err = ReservedKeyError("Target".into());
        assert_eq!(err.to_string(), "custom field key 'Target' is reserved");
    }

    #[test]
    fn snapshot_error_display() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = SnapshotError {
            subject: "Order".into(),
            source,
        };
        assert!(err.to_string().starts_with("cannot snapshot Order:"));
    }
}
