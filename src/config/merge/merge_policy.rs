//! Merge rules: defaults, override order, conflict handling.
//!
//! Every key has a compiled default so later sources may override a single
//! field without restating its section.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("coordination.lock_timeout_ms", 3000_i64)?
        .set_default("coordination.import_timeout_ms", 30_000_i64)?
        .set_default("refresh.base_delay_ms", 1000_i64)?
        .set_default("refresh.max_retries", 2_i64)?
        .set_default("notifications.default_duration_ms", 4000_i64)?
        .set_default("notifications.error_duration_ms", 5000_i64)?
        .set_default("notifications.fade_ms", 300_i64)?
        .set_default("reconcile.debounce_ms", 500_i64)?
        .set_default("history.capacity", 20_i64)?
        .set_default("storage.backend", "memory")?
        .set_default("storage.path", ".periodguard/session")
}
