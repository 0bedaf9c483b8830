//! # helm-settings
//!
//! Configuration management with layered sources for the Helm console core.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`HelmSettings::default()`]
//! 2. **User file** — `~/.helm/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `HELM_*` overrides (highest priority)
//!
//! Every timing and retry constant in the system (request timeout, reconnect
//! backoff, stage timeout, review retry bound) is policy, not structure, and
//! lives here.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
///
/// Initialized on first access via [`get_settings`]. Loaded from
/// `~/.helm/settings.json` with env var overrides, or compiled defaults
/// if loading fails.
static SETTINGS: OnceLock<HelmSettings> = OnceLock::new();

/// Get the global settings instance.
pub fn get_settings() -> &'static HelmSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: HelmSettings) -> std::result::Result<(), HelmSettings> {
    SETTINGS.set(settings)
}
