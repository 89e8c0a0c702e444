//! In-memory provider with a call journal.
//!
//! Keeps every record and every call made against it, so hosts can inspect
//! what a scope persisted and tests can assert exact call sequences.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::ProviderError;
use crate::event::AuditEvent;
use crate::ids::EventId;
use crate::provider::AuditProvider;

/// One call received by a [`MemoryProvider`].
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderCall {
    /// `insert`, with the id handed back and the event as received.
    Insert {
        /// Id returned to the scope.
        id: EventId,
        /// Copy of the event at call time.
        event: AuditEvent,
    },
    /// `update`, with the target id and the event as received.
    Update {
        /// Id the scope asked to overwrite.
        id: EventId,
        /// Copy of the event at call time.
        event: AuditEvent,
    },
}

impl ProviderCall {
    /// Id involved in the call.
    #[must_use]
    pub fn id(&self) -> &EventId {
        match self {
            Self::Insert { id, .. } | Self::Update { id, .. } => id,
        }
    }

    /// Event as received.
    #[must_use]
    pub fn event(&self) -> &AuditEvent {
        match self {
            Self::Insert { event, .. } | Self::Update { event, .. } => event,
        }
    }

    /// Whether this was an insert.
    #[must_use]
    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Insert { .. })
    }
}

#[derive(Default)]
struct Inner {
    records: HashMap<EventId, AuditEvent>,
    order: Vec<EventId>,
    calls: Vec<ProviderCall>,
}

/// Thread-safe in-memory record store.
#[derive(Default)]
pub struct MemoryProvider {
    inner: Mutex<Inner>,
}

impl MemoryProvider {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of one record.
    #[must_use]
    pub fn get(&self, id: &EventId) -> Option<AuditEvent> {
        self.inner.lock().records.get(id).cloned()
    }

    /// All records, in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<(EventId, AuditEvent)> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).map(|e| (id.clone(), e.clone())))
            .collect()
    }

    /// Every call received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.inner.lock().calls.clone()
    }

    /// Number of insert calls received.
    #[must_use]
    pub fn insert_count(&self) -> usize {
        self.inner.lock().calls.iter().filter(|c| c.is_insert()).count()
    }

    /// Number of update calls received.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.inner.lock().calls.iter().filter(|c| !c.is_insert()).count()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all records and the call journal.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.records.clear();
        inner.order.clear();
        inner.calls.clear();
    }
}

impl AuditProvider for MemoryProvider {
    fn insert(&self, event: &AuditEvent) -> Result<EventId, ProviderError> {
        let id = EventId::generate();
        let mut inner = self.inner.lock();
        let _ = inner.records.insert(id.clone(), event.clone());
        inner.order.push(id.clone());
        inner.calls.push(ProviderCall::Insert {
            id: id.clone(),
            event: event.clone(),
        });
        debug!(event_id = %id, event_type = event.event_type(), "memory provider insert");
        Ok(id)
    }

    fn update(&self, id: &EventId, event: &AuditEvent) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.records.get_mut(id) else {
            return Err(ProviderError::NotFound(id.clone()));
        };
        *slot = event.clone();
        inner.calls.push(ProviderCall::Update {
            id: id.clone(),
            event: event.clone(),
        });
        debug!(event_id = %id, event_type = event.event_type(), "memory provider update");
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryProvider")
            .field("records", &inner.records.len())
            .field("calls", &inner.calls.len())
            .finish()
    }
}
