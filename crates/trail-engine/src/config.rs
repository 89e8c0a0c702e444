//! Configuration registry.
//!
//! A [`Configuration`] bundles what every scope needs from its surroundings:
//! the default provider, the default creation policy, the custom action
//! pipeline, the environment source, and the global disable switch.
//!
//! It can be injected per scope through
//! [`ScopeOptions::configuration`](crate::scope::ScopeOptions::configuration),
//! or read from the process-wide registry. The registry holds an
//! `Arc<Configuration>` behind a read-preferring lock. Writers build a new
//! configuration and swap the pointer, so a scope that read the registry keeps
//! a complete, immutable view for its whole life.
//!
//! ```
//! use trail_core::{CreationPolicy, MemoryProvider};
//! use trail_engine::config;
//!
//! config::configure(|setup| {
//!     setup
//!         .use_provider(MemoryProvider::new())
//!         .with_creation_policy(CreationPolicy::InsertOnStartReplaceOnEnd)
//! });
//! assert_eq!(
//!     config::current().creation_policy(),
//!     CreationPolicy::InsertOnStartReplaceOnEnd
//! );
//! ```

use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::debug;
use trail_core::{AuditProvider, BoxError, CreationPolicy, EnvironmentSource, SystemEnvironment};
use trail_settings::TrailSettings;

use crate::actions::{ActionPipeline, ActionType, CustomAction};
use crate::scope::AuditScope;

/// Immutable view of scope defaults.
#[derive(Clone)]
pub struct Configuration {
    provider: Option<Arc<dyn AuditProvider>>,
    creation_policy: CreationPolicy,
    actions: ActionPipeline,
    environment: Arc<dyn EnvironmentSource>,
    audit_disabled: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            provider: None,
            creation_policy: CreationPolicy::default(),
            actions: ActionPipeline::new(),
            environment: Arc::new(SystemEnvironment),
            audit_disabled: false,
        }
    }
}

impl Configuration {
    /// Start from defaults.
    #[must_use]
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder {
            config: Self::default(),
        }
    }

    /// Continue from this configuration.
    #[must_use]
    pub fn to_builder(&self) -> ConfigurationBuilder {
        ConfigurationBuilder {
            config: self.clone(),
        }
    }

    /// Default provider, if any.
    #[must_use]
    pub fn provider(&self) -> Option<&Arc<dyn AuditProvider>> {
        self.provider.as_ref()
    }

    /// Default creation policy.
    #[must_use]
    pub fn creation_policy(&self) -> CreationPolicy {
        self.creation_policy
    }

    /// Registered custom actions.
    #[must_use]
    pub fn actions(&self) -> &ActionPipeline {
        &self.actions
    }

    /// Environment metadata source.
    #[must_use]
    pub fn environment(&self) -> &Arc<dyn EnvironmentSource> {
        &self.environment
    }

    /// Whether scopes are inert.
    #[must_use]
    pub fn audit_disabled(&self) -> bool {
        self.audit_disabled
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("creation_policy", &self.creation_policy)
            .field("actions", &self.actions)
            .field("audit_disabled", &self.audit_disabled)
            .finish_non_exhaustive()
    }
}

/// Fluent setup for a [`Configuration`].
#[must_use]
pub struct ConfigurationBuilder {
    config: Configuration,
}

impl ConfigurationBuilder {
    /// Set the default provider.
    pub fn use_provider(self, provider: impl AuditProvider + 'static) -> Self {
        self.use_shared_provider(Arc::new(provider))
    }

    /// Set the default provider from a shared handle.
    pub fn use_shared_provider(mut self, provider: Arc<dyn AuditProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    /// Set the default creation policy.
    pub fn with_creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.config.creation_policy = policy;
        self
    }

    /// Append an unnamed custom action.
    pub fn add_custom_action<F>(self, action_type: ActionType, handler: F) -> Self
    where
        F: Fn(&mut AuditScope) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add_action(CustomAction::new(action_type, handler))
    }

    /// Append a prepared custom action.
    pub fn add_action(mut self, action: CustomAction) -> Self {
        self.config.actions.push(action);
        self
    }

    /// Drop every custom action.
    pub fn reset_custom_actions(mut self) -> Self {
        self.config.actions.clear();
        self
    }

    /// Replace the environment metadata source.
    pub fn with_environment(mut self, environment: impl EnvironmentSource + 'static) -> Self {
        self.config.environment = Arc::new(environment);
        self
    }

    /// Turn every scope inert (or back on).
    pub fn audit_disabled(mut self, disabled: bool) -> Self {
        self.config.audit_disabled = disabled;
        self
    }

    /// Apply the policy and disable switch from loaded settings.
    pub fn with_settings(self, settings: &TrailSettings) -> Self {
        self.with_creation_policy(settings.creation_policy)
            .audit_disabled(settings.audit_disabled)
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> Configuration {
        self.config
    }
}

static REGISTRY: LazyLock<RwLock<Arc<Configuration>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Configuration::default())));

/// Snapshot of the process-wide configuration.
pub fn current() -> Arc<Configuration> {
    Arc::clone(&REGISTRY.read())
}

/// Update the process-wide configuration.
///
/// `setup` receives a builder seeded with the current configuration; its
/// result replaces the registry contents atomically. Writers are serialized,
/// so `setup` must not call back into the registry.
pub fn configure(setup: impl FnOnce(ConfigurationBuilder) -> ConfigurationBuilder) {
    let mut slot = REGISTRY.write();
    let next = setup(slot.to_builder()).build();
    debug!(config = ?next, "audit configuration updated");
    *slot = Arc::new(next);
}

/// Replace the process-wide configuration wholesale.
pub fn replace(configuration: Configuration) {
    *REGISTRY.write() = Arc::new(configuration);
}

/// Set the process-wide default provider.
pub fn set_default_provider(provider: impl AuditProvider + 'static) {
    configure(|setup| setup.use_provider(provider));
}

/// Set the process-wide default creation policy.
pub fn set_default_creation_policy(policy: CreationPolicy) {
    configure(|setup| setup.with_creation_policy(policy));
}

/// Append a process-wide custom action.
pub fn add_custom_action<F>(action_type: ActionType, handler: F)
where
    F: Fn(&mut AuditScope) -> Result<(), BoxError> + Send + Sync + 'static,
{
    configure(|setup| setup.add_custom_action(action_type, handler));
}

/// Remove every process-wide custom action.
pub fn reset_custom_actions() {
    configure(ConfigurationBuilder::reset_custom_actions);
}

/// Turn every scope created from the registry inert (or back on).
pub fn set_audit_disabled(disabled: bool) {
    configure(|setup| setup.audit_disabled(disabled));
}
