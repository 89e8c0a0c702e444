//! # trail-core
//!
//! Data model and persistence contract for scoped audit trails.
//!
//! - [`AuditEvent`](event::AuditEvent): the record a scope builds: target
//!   before/after snapshots, environment, timing, comments, custom fields.
//! - [`snapshot`](snapshot::snapshot): deep structural capture of any
//!   `Serialize` value into a [`serde_json::Value`].
//! - [`CreationPolicy`](policy::CreationPolicy): when and how often a scope
//!   persists its event.
//! - [`AuditProvider`](provider::AuditProvider): the insert/update contract
//!   implemented by persistence backends.
//! - [`EnvironmentSource`](environment::EnvironmentSource): injectable source
//!   of user, machine, domain, and culture metadata.

#![deny(unsafe_code)]

pub mod environment;
pub mod errors;
pub mod event;
pub mod ids;
pub mod memory;
pub mod policy;
pub mod provider;
pub mod snapshot;

pub use environment::{EnvironmentSource, StaticEnvironment, SystemEnvironment};
pub use errors::{BoxError, ProviderError, ReservedKeyError, SnapshotError};
pub use event::{AuditEnvironment, AuditEvent, AuditTarget};
pub use ids::EventId;
pub use memory::{MemoryProvider, ProviderCall};
pub use policy::CreationPolicy;
pub use provider::{AuditProvider, DynamicProvider};
pub use snapshot::{snapshot, type_label};
