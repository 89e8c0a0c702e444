//! Audit provider that writes records into the tracing pipeline.

use tracing::info;
use trail_core::{AuditEvent, AuditProvider, EventId, ProviderError};

/// Tracing target every audit record is emitted under.
pub const AUDIT_TARGET: &str = "trail::audit";

/// Emits each insert and update as an `INFO` event on [`AUDIT_TARGET`].
///
/// The full record travels as a JSON string in the `record` field, so any
/// subscriber layer (the JSON formatter, [`AuditLogLayer`](crate::AuditLogLayer),
/// a forwarder) can pick it up. Ids are generated locally.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProvider;

impl TracingProvider {
    /// New provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl AuditProvider for TracingProvider {
    fn insert(&self, event: &AuditEvent) -> Result<EventId, ProviderError> {
        let record = serde_json::to_string(event).map_err(ProviderError::insert)?;
        let id = EventId::generate();
        info!(
            target: AUDIT_TARGET,
            operation = "insert",
            event_id = %id,
            event_type = event.event_type(),
            record = %record,
            "audit record"
        );
        Ok(id)
    }

    fn update(&self, id: &EventId, event: &AuditEvent) -> Result<(), ProviderError> {
        let record = serde_json::to_string(event).map_err(ProviderError::update)?;
        info!(
            target: AUDIT_TARGET,
            operation = "update",
            event_id = %id,
            event_type = event.event_type(),
            record = %record,
            "audit record"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}
