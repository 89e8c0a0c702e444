//! Errors surfaced by scope operations.

use thiserror::Error;
use trail_core::{BoxError, ProviderError, ReservedKeyError, SnapshotError};

use crate::actions::ActionType;

/// Failure of [`begin`](crate::scope::ScopeOptions::begin), a mutator,
/// [`save`](crate::scope::AuditScope::save) or [`end`](crate::scope::AuditScope::end).
///
/// Nothing is retried or swallowed; every variant reaches the caller of the
/// operation that triggered it.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// No provider was configured and none was supplied to the scope.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The target or a custom field value could not be snapshotted.
    #[error(transparent)]
    Serialization(#[from] SnapshotError),

    /// The provider failed to insert or update.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A custom action handler returned an error.
    #[error("custom action '{name}' failed during {action_type}: {source}")]
    Action {
        /// Handler name.
        name: String,
        /// Lifecycle point being dispatched.
        action_type: ActionType,
        /// The handler's error.
        #[source]
        source: BoxError,
    },

    /// A custom field used a key owned by the event itself.
    #[error("custom field key '{0}' is reserved")]
    ReservedField(String),
}

impl From<ReservedKeyError> for ScopeError {
    fn from(err: ReservedKeyError) -> Self {
        Self::ReservedField(err.0)
    }
}
