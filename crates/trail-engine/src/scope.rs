//! Audit scope: the lifecycle state machine.
//!
//! ```text
//!            begin
//!              │  snapshot Old, merge extra fields,
//!              │  OnScopeCreated hooks, start-of-scope insert (policy)
//!              ▼
//!          ┌────────┐  discard()  ┌───────────┐
//!          │ Active │────────────▶│ Discarded │
//!          └────────┘             └───────────┘
//!              │ end() / drop
//!              │  EndDate, snapshot New,
//!              │  OnEventSaving hooks, end-of-scope save (policy)
//!              ▼
//!          ┌────────┐
//!          │ Saved  │
//!          └────────┘
//! ```
//!
//! A scope is owned by one caller. `end()` consumes it and reports errors;
//! if the scope is dropped without `end()` (early return, `?`, panic) the
//! same routine runs from `Drop` and any error is logged instead. Either way
//! it runs exactly once.
//!
//! Once a scope is discarded, mutators are silent no-ops and saves do not
//! reach the provider. A start-of-scope insert that already happened stays.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};
use trail_core::{
    snapshot, type_label, AuditEnvironment, AuditEvent, AuditProvider, CreationPolicy, EventId,
    SnapshotError,
};

use crate::actions::ActionType;
use crate::config::{self, Configuration};
use crate::error::ScopeError;

/// Exception text recorded when a scope is dropped during a panic.
pub const PANICKED: &str = "panicked";

/// Where a scope is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeState {
    /// Accepting mutations; persistence still pending.
    Active,
    /// Ended normally.
    Saved,
    /// Discarded; no further persistence.
    Discarded,
}

type Getter = dyn Fn() -> Result<Value, SnapshotError> + Send;

/// How a scope reaches the object it tracks.
///
/// The getter is called twice: at begin for `Target.Old` and at end for
/// `Target.New`.
pub struct TargetSource {
    type_name: String,
    getter: Box<Getter>,
}

impl TargetSource {
    /// Track whatever `getter` returns.
    pub fn from_fn<T, F>(getter: F) -> Self
    where
        T: Serialize,
        F: Fn() -> T + Send + 'static,
    {
        let type_name = type_label::<T>();
        let subject = type_name.clone();
        Self {
            type_name,
            getter: Box::new(move || snapshot(subject.as_str(), &getter())),
        }
    }

    /// Track a shared object without keeping it alive.
    ///
    /// Only a weak handle is held. If every owner is gone by the time the
    /// scope ends, `Target.New` is `null`.
    pub fn shared<T>(target: &Arc<RwLock<T>>) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        let type_name = type_label::<T>();
        let subject = type_name.clone();
        let weak = Arc::downgrade(target);
        Self {
            type_name,
            getter: Box::new(move || match weak.upgrade() {
                Some(target) => snapshot(subject.as_str(), &*target.read()),
                None => Ok(Value::Null),
            }),
        }
    }

    /// Override the reported `Target.Type`.
    #[must_use]
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Reported `Target.Type`.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    fn capture(&self) -> Result<Value, SnapshotError> {
        (self.getter)()
    }
}

impl fmt::Debug for TargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetSource")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Parameters for opening a scope.
#[must_use]
pub struct ScopeOptions {
    event_type: String,
    target: Option<TargetSource>,
    extra_fields: Vec<(String, Result<Value, SnapshotError>)>,
    creation_policy: Option<CreationPolicy>,
    provider: Option<Arc<dyn AuditProvider>>,
    configuration: Option<Arc<Configuration>>,
}

impl ScopeOptions {
    /// Options for an event of the given kind.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            target: None,
            extra_fields: Vec::new(),
            creation_policy: None,
            provider: None,
            configuration: None,
        }
    }

    /// Object to snapshot before and after.
    pub fn target(mut self, target: TargetSource) -> Self {
        self.target = Some(target);
        self
    }

    /// Merge the members of a JSON object into the custom fields.
    ///
    /// A value that is not an object fails [`begin`](Self::begin) with a
    /// serialization error.
    pub fn extra_fields(mut self, fields: Value) -> Self {
        match fields {
            Value::Object(map) => self
                .extra_fields
                .extend(map.into_iter().map(|(k, v)| (k, Ok(v)))),
            other => self.extra_fields.push((
                String::new(),
                Err(SnapshotError {
                    subject: "extra fields".to_string(),
                    source: serde::ser::Error::custom(format!(
                        "expected a JSON object, got {other}"
                    )),
                }),
            )),
        }
        self
    }

    /// Add one custom field, snapshotted now.
    pub fn extra_field<V: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &V) -> Self {
        let key = key.into();
        let captured = snapshot(key.as_str(), value);
        self.extra_fields.push((key, captured));
        self
    }

    /// Policy for this scope, overriding the configured default.
    pub fn creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.creation_policy = Some(policy);
        self
    }

    /// Provider for this scope, overriding the configured default.
    pub fn provider(self, provider: impl AuditProvider + 'static) -> Self {
        self.shared_provider(Arc::new(provider))
    }

    /// Shared provider for this scope, overriding the configured default.
    pub fn shared_provider(mut self, provider: Arc<dyn AuditProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use this configuration instead of the process-wide registry.
    pub fn configuration(mut self, configuration: Arc<Configuration>) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Open the scope.
    ///
    /// Captures `Target.Old`, merges extra fields, runs `OnScopeCreated`
    /// actions, then performs the policy's start-of-scope insert unless an
    /// action discarded the scope.
    #[track_caller]
    pub fn begin(self) -> Result<AuditScope, ScopeError> {
        let caller = Location::caller();
        let config = self.configuration.unwrap_or_else(config::current);
        let policy = self.creation_policy.unwrap_or(config.creation_policy());
        let environment = capture_environment(&config, caller);
        let mut event = AuditEvent::new(self.event_type, environment, now());

        if config.audit_disabled() {
            debug!(event_type = event.event_type(), "auditing disabled, scope is inert");
            return Ok(AuditScope {
                event,
                target: None,
                policy,
                provider: None,
                config,
                event_id: None,
                state: ScopeState::Active,
                finished: false,
            });
        }

        let provider = self
            .provider
            .or_else(|| config.provider().cloned())
            .ok_or_else(|| ScopeError::Configuration("no audit provider configured".into()))?;

        if let Some(target) = &self.target {
            let old = target.capture()?;
            event.set_target(target.type_name(), old);
        }

        for (key, value) in self.extra_fields {
            let _ = event.insert_custom_field(key, value?)?;
        }

        let mut scope = AuditScope {
            event,
            target: self.target,
            policy,
            provider: Some(provider),
            config,
            event_id: None,
            state: ScopeState::Active,
            finished: false,
        };
        debug!(
            event_type = scope.event.event_type(),
            policy = %policy,
            provider = scope.provider_name(),
            "audit scope created"
        );

        if let Err(err) = scope.start() {
            // The caller never receives this scope; keep Drop from saving it.
            scope.finished = true;
            return Err(err);
        }
        Ok(scope)
    }
}

impl fmt::Debug for ScopeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeOptions")
            .field("event_type", &self.event_type)
            .field("target", &self.target)
            .field("creation_policy", &self.creation_policy)
            .finish_non_exhaustive()
    }
}

/// A tracked unit of work.
pub struct AuditScope {
    event: AuditEvent,
    target: Option<TargetSource>,
    policy: CreationPolicy,
    // None when auditing is disabled.
    provider: Option<Arc<dyn AuditProvider>>,
    config: Arc<Configuration>,
    event_id: Option<EventId>,
    state: ScopeState,
    finished: bool,
}

impl AuditScope {
    /// Open a scope tracking `target` with the registry defaults.
    #[track_caller]
    pub fn begin(event_type: impl Into<String>, target: TargetSource) -> Result<Self, ScopeError> {
        ScopeOptions::new(event_type).target(target).begin()
    }

    /// Record a one-off event with no target: insert once and finish.
    ///
    /// Returns the stored id, or `None` when an action discarded the event or
    /// auditing is disabled.
    #[track_caller]
    pub fn log(event_type: impl Into<String>, extra_fields: Value) -> Result<Option<EventId>, ScopeError> {
        ScopeOptions::new(event_type)
            .extra_fields(extra_fields)
            .creation_policy(CreationPolicy::InsertOnEnd)
            .begin()?
            .end()
    }

    /// Run `body` inside a scope.
    ///
    /// The scope always ends when `body` returns. If `body` fails, its error
    /// text is recorded as `Environment.Exception` before the end-of-scope
    /// save and the body's error is returned; an error from ending the scope
    /// is then only logged. If `body` succeeds, an error from ending the
    /// scope is returned.
    #[track_caller]
    pub fn track<T, E, F>(options: ScopeOptions, body: F) -> Result<T, E>
    where
        E: From<ScopeError> + fmt::Display,
        F: FnOnce(&mut AuditScope) -> Result<T, E>,
    {
        let mut scope = options.begin()?;
        match body(&mut scope) {
            Ok(value) => {
                let _ = scope.end()?;
                Ok(value)
            }
            Err(err) => {
                scope.set_exception(err.to_string());
                if let Err(end_err) = scope.end() {
                    error!(error = %end_err, "failed to end audit scope after body error");
                }
                Err(err)
            }
        }
    }

    /// The event built so far.
    #[must_use]
    pub fn event(&self) -> &AuditEvent {
        &self.event
    }

    /// Mutable access to the event, for custom actions that enrich it.
    ///
    /// `None` once the scope is discarded, like every other mutator.
    pub fn event_mut(&mut self) -> Option<&mut AuditEvent> {
        if self.ignore_after_terminal("event_mut") {
            return None;
        }
        Some(&mut self.event)
    }

    /// Id assigned by the provider's most recent insert.
    #[must_use]
    pub fn event_id(&self) -> Option<&EventId> {
        self.event_id.as_ref()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ScopeState {
        self.state
    }

    /// Policy in effect.
    #[must_use]
    pub fn creation_policy(&self) -> CreationPolicy {
        self.policy
    }

    /// Whether the scope was discarded.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.state == ScopeState::Discarded
    }

    /// Whether auditing was disabled when the scope began.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.provider.is_none()
    }

    /// Configuration the scope was opened with.
    #[must_use]
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    /// Rename the operation kind.
    pub fn set_event_type(&mut self, event_type: impl Into<String>) {
        if self.ignore_after_terminal("set_event_type") {
            return;
        }
        self.event.set_event_type(event_type);
    }

    /// Snapshot `value` now and store it under `key`, replacing any
    /// previous value.
    pub fn set_custom_field<V: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &V,
    ) -> Result<(), ScopeError> {
        if self.ignore_after_terminal("set_custom_field") {
            return Ok(());
        }
        let key = key.into();
        if AuditEvent::is_reserved_key(&key) {
            return Err(ScopeError::ReservedField(key));
        }
        let value = snapshot(key.as_str(), value)?;
        let _ = self.event.insert_custom_field(key, value)?;
        Ok(())
    }

    /// Append a comment.
    pub fn comment(&mut self, text: impl Into<String>) {
        if self.ignore_after_terminal("comment") {
            return;
        }
        self.event.add_comment(text);
    }

    /// Record a failure of the instrumented block.
    pub fn set_exception(&mut self, text: impl Into<String>) {
        if self.ignore_after_terminal("set_exception") {
            return;
        }
        self.event.environment_mut().exception = Some(text.into());
    }

    /// Stop all future persistence for this scope.
    ///
    /// Irreversible. A start-of-scope insert that already happened is not
    /// retracted.
    pub fn discard(&mut self) {
        if self.state == ScopeState::Active {
            debug!(event_type = self.event.event_type(), "audit scope discarded");
            self.state = ScopeState::Discarded;
        }
    }

    /// Persist the event now: insert if nothing was inserted yet, else update.
    ///
    /// Refreshes `EndDate` and `Target.New` first and runs the
    /// `OnEventSaving` actions. Meant for [`CreationPolicy::Manual`]; under
    /// other policies it acts as an explicit extra save. Does nothing on a
    /// discarded or disabled scope.
    pub fn save(&mut self) -> Result<(), ScopeError> {
        if self.is_disabled() || self.is_discarded() {
            debug!(event_type = self.event.event_type(), "save skipped");
            return Ok(());
        }
        self.capture_end()?;
        self.dispatch(ActionType::OnEventSaving)?;
        if self.is_discarded() {
            return Ok(());
        }
        self.upsert()
    }

    /// End the scope and apply the end-of-scope save.
    ///
    /// Returns the id of the record written at end, if any.
    pub fn end(mut self) -> Result<Option<EventId>, ScopeError> {
        self.finish()
    }

    fn start(&mut self) -> Result<(), ScopeError> {
        self.dispatch(ActionType::OnScopeCreated)?;
        if self.is_discarded() || !self.policy.inserts_on_start() {
            return Ok(());
        }
        self.insert()
    }

    fn finish(&mut self) -> Result<Option<EventId>, ScopeError> {
        if self.finished {
            return Ok(None);
        }
        self.finished = true;

        if self.is_discarded() {
            return Ok(None);
        }
        if self.is_disabled() || !self.policy.saves_on_end() {
            self.state = ScopeState::Saved;
            return Ok(None);
        }

        self.capture_end()?;
        self.dispatch(ActionType::OnEventSaving)?;
        if self.is_discarded() {
            return Ok(None);
        }
        match self.policy {
            CreationPolicy::InsertOnStartInsertOnEnd => self.insert()?,
            _ => self.upsert()?,
        }

        self.state = ScopeState::Saved;
        debug!(
            event_type = self.event.event_type(),
            event_id = self.event_id.as_ref().map(EventId::as_str),
            duration_ms = self.event.duration_ms(),
            "audit scope ended"
        );
        Ok(self.event_id.clone())
    }

    fn capture_end(&mut self) -> Result<(), ScopeError> {
        let new = self.target.as_ref().map(TargetSource::capture).transpose()?;
        self.event.finish(now(), new);
        Ok(())
    }

    fn dispatch(&mut self, action_type: ActionType) -> Result<(), ScopeError> {
        let config = Arc::clone(&self.config);
        config.actions().dispatch(action_type, self)
    }

    fn insert(&mut self) -> Result<(), ScopeError> {
        let Some(provider) = self.provider.clone() else {
            return Ok(());
        };
        let id = provider.insert(&self.event)?;
        debug!(event_id = %id, provider = provider.name(), final_event = self.event.is_final(), "audit event inserted");
        self.event_id = Some(id);
        Ok(())
    }

    fn upsert(&mut self) -> Result<(), ScopeError> {
        let Some(provider) = self.provider.clone() else {
            return Ok(());
        };
        match &self.event_id {
            Some(id) => {
                provider.update(id, &self.event)?;
                debug!(event_id = %id, provider = provider.name(), "audit event updated");
                Ok(())
            }
            None => self.insert(),
        }
    }

    fn ignore_after_terminal(&self, operation: &str) -> bool {
        let terminal = self.state != ScopeState::Active;
        if terminal {
            debug!(operation, state = ?self.state, "ignoring mutation of finished audit scope");
        }
        terminal
    }

    fn provider_name(&self) -> &str {
        self.provider.as_ref().map_or("none", |p| p.name())
    }
}

impl Drop for AuditScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if std::thread::panicking() && self.event.environment().exception.is_none() {
            self.event.environment_mut().exception = Some(PANICKED.to_string());
        }
        if let Err(err) = self.finish() {
            error!(
                event_type = self.event.event_type(),
                error = %err,
                "failed to end audit scope on drop"
            );
        }
    }
}

impl fmt::Debug for AuditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditScope")
            .field("event_type", &self.event.event_type())
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("event_id", &self.event_id)
            .field("provider", &self.provider_name())
            .finish_non_exhaustive()
    }
}

fn now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

fn capture_environment(config: &Configuration, caller: &Location<'_>) -> AuditEnvironment {
    let source = config.environment();
    AuditEnvironment {
        user_name: source.user_name(),
        machine_name: source.machine_name(),
        domain_name: source.domain_name(),
        calling_method_name: Some(format!(
            "{}:{}:{}",
            caller.file(),
            caller.line(),
            caller.column()
        )),
        exception: None,
        culture: source.culture(),
    }
}
