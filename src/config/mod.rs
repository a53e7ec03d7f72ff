//! Runtime Configuration Module
//!
//! Provides process-wide detection settings loaded from TOML, replacing
//! hardcoded detector thresholds with analyst-tunable values.
//!
//! ## Loading Order
//!
//! 1. `DARKFLEET_CONFIG` environment variable (path to TOML file)
//! 2. `darkfleet.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Feature flags additionally accept `DARKFLEET_*` boolean environment
//! overrides (e.g. `DARKFLEET_DARK_STS_ENABLED=true`), applied after the
//! file is parsed.
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(Settings::load());
//!
//! // Anywhere in the codebase:
//! let min_hours = config::get().detection.gap_min_hours;
//! ```
//!
//! The risk-scoring point catalogue is deliberately NOT part of this
//! module — it lives in `scoring::ScoringConfig`, a separate frozen,
//! hash-audited document.

pub mod defaults;
mod settings;

pub use settings::*;

use std::sync::OnceLock;

/// Global runtime settings, initialized once at startup.
static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Initialize the global settings.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(settings: Settings) {
    if SETTINGS.set(settings).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global settings.
///
/// Panics if `init()` has not been called. This is by design — a missing
/// config is a fatal startup error, not a recoverable condition.
#[allow(clippy::expect_used)]
pub fn get() -> &'static Settings {
    SETTINGS
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the settings have been initialized.
///
/// Useful for tests and optional config paths.
pub fn is_initialized() -> bool {
    SETTINGS.get().is_some()
}
