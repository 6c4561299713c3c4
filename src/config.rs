//! Configuration System
//!
//! Layered configuration: compiled defaults, then the global file, then the
//! workspace files, then `PERIODGUARD__SECTION__KEY` environment variables.

use crate::coordinator::CoordinatorPolicy;
use crate::error::GuardError;
use crate::logging::LoggingConfig;
use crate::notify::{NotificationPolicy, MAX_DURATION_MS, MIN_DURATION_MS};
use crate::reconcile::ReconcileConfig;
use crate::refresh::RetryPolicy;
use crate::store::DEFAULT_HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod merge;
mod sources;

pub use sources::environment::ENV_PREFIX;
pub use sources::workspace_file::ENV_PROFILE;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub coordination: CoordinatorPolicy,

    #[serde(default)]
    pub refresh: RetryPolicy,

    #[serde(default)]
    pub notifications: NotificationPolicy,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Retained change records; oldest dropped first.
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Session-scoped; lost when the process exits.
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database directory for the sled backend.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from(".periodguard/session"),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("coordination: {0}")]
    Coordination(String),
    #[error("refresh: {0}")]
    Refresh(String),
    #[error("notifications: {0}")]
    Notifications(String),
    #[error("reconcile: {0}")]
    Reconcile(String),
    #[error("history: {0}")]
    History(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("logging: {0}")]
    Logging(String),
}

impl GuardConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.coordination.lock_timeout_ms == 0 {
            errors.push(ValidationError::Coordination(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.coordination.import_timeout_ms == 0 {
            errors.push(ValidationError::Coordination(
                "import_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.refresh.base_delay_ms == 0 {
            errors.push(ValidationError::Refresh(
                "base_delay_ms must be greater than zero".to_string(),
            ));
        }
        if self.refresh.max_retries > 10 {
            errors.push(ValidationError::Refresh(format!(
                "max_retries {} exceeds 10",
                self.refresh.max_retries
            )));
        }

        let range = MIN_DURATION_MS..=MAX_DURATION_MS;
        for (name, value) in [
            ("default_duration_ms", self.notifications.default_duration_ms),
            ("error_duration_ms", self.notifications.error_duration_ms),
        ] {
            if !range.contains(&value) {
                errors.push(ValidationError::Notifications(format!(
                    "{} {} outside {}..={}",
                    name, value, MIN_DURATION_MS, MAX_DURATION_MS
                )));
            }
        }

        if self.reconcile.debounce_ms > 10_000 {
            errors.push(ValidationError::Reconcile(format!(
                "debounce_ms {} exceeds 10000",
                self.reconcile.debounce_ms
            )));
        }

        if self.history.capacity == 0 {
            errors.push(ValidationError::History(
                "capacity must be at least 1".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Sled && self.storage.path.as_os_str().is_empty()
        {
            errors.push(ValidationError::Storage(
                "path cannot be empty for the sled backend".to_string(),
            ));
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold every problem into one error.
    pub fn validated(self) -> Result<Self, GuardError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            GuardError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(self)
    }
}

/// Builds a [`GuardConfig`] from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root`.
    pub fn load(workspace_root: &Path) -> Result<GuardConfig, GuardError> {
        let builder = merge::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = sources::environment::add_to_builder(builder);
        let config = builder.build()?.try_deserialize::<GuardConfig>()?;
        Ok(config)
    }

    /// Load a single file on top of the compiled defaults.
    pub fn load_from_file(path: &Path) -> Result<GuardConfig, GuardError> {
        let config = merge::builder_with_defaults()?
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize::<GuardConfig>()?;
        Ok(config)
    }

    pub fn xdg_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Serializes tests that touch HOME / XDG_CONFIG_HOME / PERIODGUARD__*.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&'static str, Option<&str>)]) -> Self {
            let saved = vars
                .iter()
                .map(|(k, _)| (*k, std::env::var(k).ok()))
                .collect();
            for (k, v) in vars {
                match v {
                    Some(v) => std::env::set_var(k, v),
                    None => std::env::remove_var(k),
                }
            }
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in &self.saved {
                match v {
                    Some(v) => std::env::set_var(k, v),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.coordination.lock_timeout_ms, 3000);
        assert_eq!(config.refresh.base_delay_ms, 1000);
        assert_eq!(config.refresh.max_retries, 2);
        assert_eq!(config.history.capacity, 20);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = GuardConfig::default();
        config.coordination.lock_timeout_ms = 0;
        config.history.capacity = 0;
        config.notifications.default_duration_ms = 100;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::History(
            "capacity must be at least 1".to_string()
        )));
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("guard.toml");
        std::fs::write(
            &config_file,
            r#"
[coordination]
lock_timeout_ms = 4500

[storage]
backend = "sled"
path = "/tmp/periodguard-test"
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&config_file).unwrap();
        assert_eq!(config.coordination.lock_timeout_ms, 4500);
        assert_eq!(config.coordination.import_timeout_ms, 30_000);
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.refresh, RetryPolicy::default());
    }

    #[test]
    fn test_workspace_config_overrides_global_config() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let xdg = temp_dir.path().join("xdg");
        let workspace = temp_dir.path().join("workspace");
        std::fs::create_dir_all(xdg.join("periodguard")).unwrap();
        std::fs::create_dir_all(workspace.join("config")).unwrap();
        let _env = EnvGuard::set(&[
            ("XDG_CONFIG_HOME", xdg.to_str()),
            (ENV_PROFILE, None),
            ("PERIODGUARD__REFRESH__MAX_RETRIES", None),
        ]);

        std::fs::write(
            xdg.join("periodguard").join("config.toml"),
            "[refresh]\nbase_delay_ms = 250\nmax_retries = 4\n",
        )
        .unwrap();
        std::fs::write(
            workspace.join("config").join("config.toml"),
            "[refresh]\nmax_retries = 1\n",
        )
        .unwrap();

        assert_eq!(
            ConfigLoader::xdg_config_path(),
            Some(xdg.join("periodguard").join("config.toml"))
        );
        let config = ConfigLoader::load(&workspace).unwrap();
        assert_eq!(config.refresh.base_delay_ms, 250);
        assert_eq!(config.refresh.max_retries, 1);
    }

    #[test]
    fn test_environment_overrides_files() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let _env = EnvGuard::set(&[
            ("XDG_CONFIG_HOME", temp_dir.path().join("none").to_str()),
            ("PERIODGUARD__COORDINATION__LOCK_TIMEOUT_MS", Some("1200")),
        ]);

        let config = ConfigLoader::load(temp_dir.path()).unwrap();
        assert_eq!(config.coordination.lock_timeout_ms, 1200);
        assert_eq!(config.history.capacity, 20);
    }

    #[test]
    fn test_load_without_home_env() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let _env = EnvGuard::set(&[("HOME", None), ("XDG_CONFIG_HOME", None)]);

        assert!(ConfigLoader::xdg_config_path().is_none());
        let config = ConfigLoader::load(temp_dir.path()).unwrap();
        assert_eq!(config.coordination, CoordinatorPolicy::default());
    }
}
