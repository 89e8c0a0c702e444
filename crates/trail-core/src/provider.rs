//! Persistence provider contract.
//!
//! A provider stores audit records. The scope calls it synchronously, inline
//! with begin, end and explicit saves; there is no queue, retry or timeout in
//! between. Providers that talk to slow backends own their own timeouts.

use std::fmt;

use crate::errors::ProviderError;
use crate::event::AuditEvent;
use crate::ids::EventId;

/// A pluggable audit record store.
///
/// The event is lent for the duration of the call. Providers that keep
/// records must copy what they need.
pub trait AuditProvider: Send + Sync {
    /// Persist a new record and return an identifier for later updates.
    fn insert(&self, event: &AuditEvent) -> Result<EventId, ProviderError>;

    /// Overwrite the record identified by `id` with the current contents.
    fn update(&self, id: &EventId, event: &AuditEvent) -> Result<(), ProviderError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "provider"
    }
}

type InsertFn = dyn Fn(&AuditEvent) -> Result<EventId, ProviderError> + Send + Sync;
type UpdateFn = dyn Fn(&EventId, &AuditEvent) -> Result<(), ProviderError> + Send + Sync;

/// Provider assembled from closures.
///
/// Handy for forwarding records to an existing sink without writing a type:
///
/// ```
/// use trail_core::{DynamicProvider, EventId};
///
/// let provider = DynamicProvider::new()
///     .on_insert(|event| {
///         println!("{}", event.event_type());
///         Ok(EventId::generate())
///     })
///     .on_update(|id, _event| {
///         println!("updated {id}");
///         Ok(())
///     });
/// # let _ = provider;
/// ```
///
/// A missing insert closure generates ids without storing anything; a missing
/// update closure accepts every update.
#[derive(Default)]
pub struct DynamicProvider {
    insert: Option<Box<InsertFn>>,
    update: Option<Box<UpdateFn>>,
}

impl DynamicProvider {
    /// Provider with no behaviour attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle inserts.
    #[must_use]
    pub fn on_insert<F>(mut self, f: F) -> Self
    where
        F: Fn(&AuditEvent) -> Result<EventId, ProviderError> + Send + Sync + 'static,
    {
        self.insert = Some(Box::new(f));
        self
    }

    /// Handle updates.
    #[must_use]
    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&EventId, &AuditEvent) -> Result<(), ProviderError> + Send + Sync + 'static,
    {
        self.update = Some(Box::new(f));
        self
    }
}

impl AuditProvider for DynamicProvider {
    fn insert(&self, event: &AuditEvent) -> Result<EventId, ProviderError> {
        match &self.insert {
            Some(f) => f(event),
            None => Ok(EventId::generate()),
        }
    }

    fn update(&self, id: &EventId, event: &AuditEvent) -> Result<(), ProviderError> {
        match &self.update {
            Some(f) => f(id, event),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "dynamic"
    }
}

impl fmt::Debug for DynamicProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicProvider")
            .field("insert", &self.insert.is_some())
            .field("update", &self.update.is_some())
            .finish()
    }
}
