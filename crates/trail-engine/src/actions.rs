//! Custom action pipeline.
//!
//! An ordered list of handlers fired at two points of a scope's life:
//! [`ActionType::OnScopeCreated`] once at the end of begin, and
//! [`ActionType::OnEventSaving`] before each end-of-scope or explicit save.
//! Handlers run synchronously in registration order and get the scope
//! itself, so they can add fields, comment, or discard. The first handler
//! error stops the pipeline and reaches the caller.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use trail_core::BoxError;

use crate::error::ScopeError;
use crate::scope::AuditScope;

/// Lifecycle point a custom action is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    /// After the "before" snapshot, before any start-of-scope insert.
    OnScopeCreated,
    /// Immediately before an end-of-scope or explicit save.
    OnEventSaving,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnScopeCreated => f.write_str("OnScopeCreated"),
            Self::OnEventSaving => f.write_str("OnEventSaving"),
        }
    }
}

/// Handler signature.
pub type ActionHandler = dyn Fn(&mut AuditScope) -> Result<(), BoxError> + Send + Sync;

const ANONYMOUS: &str = "anonymous";

/// A registered handler.
#[derive(Clone)]
pub struct CustomAction {
    name: String,
    action_type: ActionType,
    handler: Arc<ActionHandler>,
}

impl CustomAction {
    /// Unnamed action.
    pub fn new<F>(action_type: ActionType, handler: F) -> Self
    where
        F: Fn(&mut AuditScope) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::named(ANONYMOUS, action_type, handler)
    }

    /// Named action. The name shows up in logs and errors.
    pub fn named<F>(name: impl Into<String>, action_type: ActionType, handler: F) -> Self
    where
        F: Fn(&mut AuditScope) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            action_type,
            handler: Arc::new(handler),
        }
    }

    /// Handler name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attachment point.
    #[must_use]
    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    fn run(&self, scope: &mut AuditScope) -> Result<(), ScopeError> {
        (self.handler)(scope).map_err(|source| ScopeError::Action {
            name: self.name.clone(),
            action_type: self.action_type,
            source,
        })
    }
}

impl fmt::Debug for CustomAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAction")
            .field("name", &self.name)
            .field("action_type", &self.action_type)
            .finish_non_exhaustive()
    }
}

/// Registration-ordered collection of custom actions.
#[derive(Clone, Default)]
pub struct ActionPipeline {
    actions: Vec<CustomAction>,
}

impl ActionPipeline {
    /// Empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action after all existing ones.
    pub fn push(&mut self, action: CustomAction) {
        debug!(name = %action.name, action_type = %action.action_type, "registering custom action");
        self.actions.push(action);
    }

    /// Remove every action with the given name. Returns whether any was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.actions.len();
        self.actions.retain(|a| a.name != name);
        self.actions.len() < before
    }

    /// Actions attached to `action_type`, in registration order.
    pub fn for_type(&self, action_type: ActionType) -> impl Iterator<Item = &CustomAction> {
        self.actions
            .iter()
            .filter(move |a| a.action_type == action_type)
    }

    /// Number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no action is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Remove every action.
    pub fn clear(&mut self) {
        self.actions.clear();
    }

    /// Run the actions attached to `action_type` against `scope`.
    ///
    /// Stops at the first failing handler.
    pub fn dispatch(&self, action_type: ActionType, scope: &mut AuditScope) -> Result<(), ScopeError> {
        for action in self.for_type(action_type) {
            debug!(name = %action.name, %action_type, event_type = scope.event().event_type(), "running custom action");
            action.run(scope)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ActionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.actions).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str, action_type: ActionType) -> CustomAction {
        CustomAction::named(name, action_type, |_| Ok(()))
    }

    #[test]
    fn new_pipeline_is_empty() {
        let pipeline = ActionPipeline::new();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.for_type(ActionType::OnScopeCreated).count(), 0);
    }

    #[test]
    fn for_type_keeps_registration_order() {
        let mut pipeline = ActionPipeline::new();
        pipeline.push(noop("first", ActionType::OnScopeCreated));
        pipeline.push(noop("saving", ActionType::OnEventSaving));
        pipeline.push(noop("second", ActionType::OnScopeCreated));

        let names: Vec<_> = pipeline
            .for_type(ActionType::OnScopeCreated)
            .map(CustomAction::name)
            .collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(pipeline.len(), 3);
    }

    #[test]
    fn duplicate_names_are_kept() {
        let mut pipeline = ActionPipeline::new();
        pipeline.push(noop("same", ActionType::OnEventSaving));
        pipeline.push(noop("same", ActionType::OnEventSaving));
        assert_eq!(pipeline.for_type(ActionType::OnEventSaving).count(), 2);
    }

    #[test]
    fn remove_by_name() {
        let mut pipeline = ActionPipeline::new();
        pipeline.push(noop("a", ActionType::OnScopeCreated));
        pipeline.push(noop("b", ActionType::OnEventSaving));
        assert!(pipeline.remove("a"));
        assert!(!pipeline.remove("a"));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn unnamed_actions_are_anonymous() {
        let action = CustomAction::new(ActionType::OnEventSaving, |_| Ok(()));
        assert_eq!(action.name(), "anonymous");
        assert_eq!(action.action_type(), ActionType::OnEventSaving);
    }

    #[test]
    fn clear_removes_everything() {
        let mut pipeline = ActionPipeline::new();
        pipeline.push(noop("a", ActionType::OnScopeCreated));
        pipeline.clear();
        assert!(pipeline.is_empty());
    }

    #[test]
    fn action_type_display() {
        assert_eq!(ActionType::OnScopeCreated.to_string(), "OnScopeCreated");
        assert_eq!(ActionType::OnEventSaving.to_string(), "OnEventSaving");
    }

    #[test]
    fn debug_lists_names() {
        let mut pipeline = ActionPipeline::new();
        pipeline.push(noop("stamp", ActionType::OnScopeCreated));
        let debug = format!("{pipeline:?}");
        assert!(debug.contains("stamp"));
    }
}
