//! Logging setup for trail binaries, plus audit providers that ride on the
//! tracing pipeline.

mod capture;
mod provider;

pub use capture::{AuditLogLayer, AuditLogRecord, AuditLogSink};
pub use provider::{TracingProvider, AUDIT_TARGET};

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub log_level: Level,
    /// Per-module level overrides (e.g. `trail_engine` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::WARN,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

/// Handle to the installed subscriber.
pub struct TelemetryGuard {
    base_level: Level,
    level_filter: Arc<RwLock<Vec<(String, Level)>>>,
    reload: Option<reload::Handle<EnvFilter, Registry>>,
}

impl TelemetryGuard {
    /// Change the log level for a specific module at runtime.
    pub fn set_module_level(&self, module: &str, level: Level) {
        let directives = {
            let mut levels = self.level_filter.write();
            if let Some(entry) = levels.iter_mut().find(|(m, _)| m == module) {
                entry.1 = level;
            } else {
                levels.push((module.to_string(), level));
            }
            filter_directives(self.base_level, &levels)
        };
        if let Some(handle) = &self.reload {
            if let Err(e) = handle.reload(EnvFilter::new(directives)) {
                tracing::warn!(error = %e, "failed to reload log filter");
            }
        }
    }

    /// Get current per-module log level overrides.
    pub fn module_levels(&self) -> Vec<(String, Level)> {
        self.level_filter.read().clone()
    }
}

/// Initialize logging to stderr. Call once at startup.
///
/// If a global subscriber is already installed the existing one is kept and
/// the returned guard only tracks level overrides.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let level_filter = Arc::new(RwLock::new(config.module_levels.clone()));
    let directives = filter_directives(config.log_level, &config.module_levels);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));
    let (filter_layer, handle) = reload::Layer::new(env_filter);

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .is_ok();
    if !installed {
        eprintln!("trail-telemetry: a global subscriber is already set");
    }

    TelemetryGuard {
        base_level: config.log_level,
        level_filter,
        reload: installed.then_some(handle),
    }
}

fn filter_directives(base: Level, modules: &[(String, Level)]) -> String {
    let mut directives = base.to_string().to_lowercase();
    for (module, level) in modules {
        directives.push_str(&format!(",{module}={}", level.to_string().to_lowercase()));
    }
    directives
}
