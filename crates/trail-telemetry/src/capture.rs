//! In-memory capture of audit records emitted by [`TracingProvider`](crate::TracingProvider).

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::provider::AUDIT_TARGET;

/// An audit record seen on the tracing pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditLogRecord {
    /// When the layer saw the record (RFC 3339, UTC).
    pub timestamp: String,
    /// `insert` or `update`.
    pub operation: String,
    /// Id the provider assigned to the record.
    pub event_id: String,
    /// `EventType` of the audited operation.
    pub event_type: String,
    /// Parsed record, or `null` if the field was not valid JSON.
    pub record: Value,
}

/// In-memory store fed by [`AuditLogLayer`].
#[derive(Default)]
pub struct AuditLogSink {
    records: Mutex<Vec<AuditLogRecord>>,
}

impl AuditLogSink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: AuditLogRecord) {
        self.records.lock().push(record);
    }

    /// Everything captured so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<AuditLogRecord> {
        self.records.lock().clone()
    }

    /// Records for one event type, oldest first.
    #[must_use]
    pub fn by_event_type(&self, event_type: &str) -> Vec<AuditLogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Number of records captured.
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.lock().len()
    }
}

impl fmt::Debug for AuditLogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLogSink")
            .field("count", &self.count())
            .finish()
    }
}

/// tracing Layer that copies audit records into an [`AuditLogSink`].
pub struct AuditLogLayer {
    sink: Arc<AuditLogSink>,
}

impl AuditLogLayer {
    /// Layer feeding `sink`.
    pub fn new(sink: Arc<AuditLogSink>) -> Self {
        Self { sink }
    }
}

#[derive(Default)]
struct FieldVisitor {
    operation: Option<String>,
    event_id: Option<String>,
    event_type: Option<String>,
    record: Option<String>,
}

impl FieldVisitor {
    fn set(&mut self, field: &Field, value: String) {
        match field.name() {
            "operation" => self.operation = Some(value),
            "event_id" => self.event_id = Some(value),
            "event_type" => self.event_type = Some(value),
            "record" => self.record = Some(value),
            _ => {}
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.set(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field, value.to_string());
    }
}

impl<S> Layer<S> for AuditLogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != AUDIT_TARGET {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let record = visitor
            .record
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(Value::Null);

        self.sink.push(AuditLogRecord {
            timestamp: Utc::now().to_rfc3339(),
            operation: visitor.operation.unwrap_or_default(),
            event_id: visitor.event_id.unwrap_or_default(),
            event_type: visitor.event_type.unwrap_or_default(),
            record,
        });
    }
}
