//! # trail-settings
//!
//! Layered settings for audit trails.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TrailSettings::default()`]
//! 2. **User file**: `~/.trail/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TRAIL_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use trail_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("default policy: {}", settings.creation_policy);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{LoggingSettings, TrailSettings};

use std::sync::OnceLock;

static SETTINGS: OnceLock<TrailSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// The first call loads `~/.trail/settings.json` with env overrides, falling
/// back to compiled defaults if loading fails.
pub fn get_settings() -> &'static TrailSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to load settings, using defaults");
            TrailSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: TrailSettings) -> std::result::Result<(), TrailSettings> {
    SETTINGS.set(settings)
}
