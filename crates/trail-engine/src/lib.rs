//! # trail-engine
//!
//! Scoped audit trails. An [`AuditScope`] snapshots a target when it opens,
//! snapshots it again when it ends, and hands the resulting
//! [`AuditEvent`](trail_core::AuditEvent) to an
//! [`AuditProvider`](trail_core::AuditProvider) according to its
//! [`CreationPolicy`](trail_core::CreationPolicy).
//!
//! ```
//! use std::sync::Arc;
//!
//! use parking_lot::RwLock;
//! use serde::Serialize;
//! use trail_core::MemoryProvider;
//! use trail_engine::{Configuration, ScopeOptions, TargetSource};
//!
//! #[derive(Serialize)]
//! struct Order {
//!     status: &'static str,
//! }
//!
//! let provider = Arc::new(MemoryProvider::new());
//! let config = Arc::new(
//!     Configuration::builder()
//!         .use_shared_provider(provider.clone())
//!         .build(),
//! );
//! let order = Arc::new(RwLock::new(Order { status: "open" }));
//!
//! let scope = ScopeOptions::new("Order:Close")
//!     .target(TargetSource::shared(&order))
//!     .configuration(config)
//!     .begin()
//!     .unwrap();
//! order.write().status = "closed";
//! scope.end().unwrap();
//!
//! let records = provider.records();
//! let (_, event) = &records[0];
//! let target = event.target().unwrap();
//! assert_eq!(target.old["status"], "open");
//! assert_eq!(target.new.as_ref().unwrap()["status"], "closed");
//! ```

#![deny(unsafe_code)]

pub mod actions;
pub mod config;
pub mod error;
pub mod scope;

pub use actions::{ActionHandler, ActionPipeline, ActionType, CustomAction};
pub use config::{Configuration, ConfigurationBuilder};
pub use error::ScopeError;
pub use scope::{AuditScope, ScopeOptions, ScopeState, TargetSource, PANICKED};
