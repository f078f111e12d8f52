//! File-based configuration.
//!
//! ```toml
//! log_path = "C:/ProgramData/App/logs/app.log"
//! app_dir = "C:/ProgramData/App"
//! window_secs = 7200
//! base_delay_ms = 1000
//! max_delay_ms = 10000
//! notify_cooldown_secs = 30
//! callback_cooldown_secs = 15
//! include_builtin_triggers = true
//!
//! [[triggers]]
//! name = "SYNC_STALLED"
//! substring = "sync: no progress"
//! ```
//!
//! Every key is optional. Custom triggers are appended after the built-ins.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::dispatch::DispatchConfig;
use crate::error::{ConfigError, WardenResult};
use crate::monitor::MonitorConfig;
use crate::trigger::TriggerRegistry;

/// A custom trigger declared in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerSpec {
    /// Unique trigger name.
    pub name: String,
    /// Literal substring to look for.
    pub substring: String,
}

/// Top-level config file contents. Keys match the module example.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WardenConfig {
    pub log_path: Option<PathBuf>,
    pub app_dir: Option<PathBuf>,
    pub window_secs: u64,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub notify_cooldown_secs: u64,
    pub callback_cooldown_secs: u64,
    pub include_builtin_triggers: bool,
    pub triggers: Vec<TriggerSpec>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            app_dir: None,
            window_secs: 2 * 60 * 60,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            notify_cooldown_secs: 30,
            callback_cooldown_secs: 15,
            include_builtin_triggers: true,
            triggers: Vec::new(),
        }
    }
}

impl WardenConfig {
    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// `ConfigError::Read` if the file cannot be read, otherwise any error from
    /// `from_toml_str`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        debug!(path = %path.display(), triggers = config.triggers.len(), "loaded config");
        Ok(config)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` for malformed TOML or unknown keys,
    /// `ConfigError::Invalid` for values that fail validation.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_secs == 0 {
            return Err(invalid("window_secs", "must be greater than zero"));
        }
        if self.base_delay_ms == 0 {
            return Err(invalid("base_delay_ms", "must be greater than zero"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(invalid(
                "max_delay_ms",
                format!("must be at least base_delay_ms ({})", self.base_delay_ms),
            ));
        }
        for spec in &self.triggers {
            if spec.substring.is_empty() {
                return Err(invalid("triggers", format!("'{}' has an empty substring", spec.name)));
            }
        }
        Ok(())
    }

    /// Builds the monitor settings.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` if no `log_path` is set.
    pub fn monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        let log_path = self
            .log_path
            .clone()
            .ok_or_else(|| invalid("log_path", "is required"))?;

        Ok(MonitorConfig {
            log_path,
            app_dir: self.app_dir.clone(),
            window: self.window(),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            dispatch: DispatchConfig {
                notify_cooldown: Duration::from_secs(self.notify_cooldown_secs),
                callback_cooldown: Duration::from_secs(self.callback_cooldown_secs),
            },
        })
    }

    /// Windowed-read span.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Builds the trigger registry: built-ins (if enabled) then custom triggers.
    ///
    /// # Errors
    ///
    /// Any `RegistryError` from defining a custom trigger.
    pub fn build_registry(&self) -> WardenResult<TriggerRegistry> {
        let registry = if self.include_builtin_triggers {
            TriggerRegistry::builtin()
        } else {
            TriggerRegistry::new()
        };
        for spec in &self.triggers {
            registry.define(spec.name.as_str(), spec.substring.as_str())?;
        }
        Ok(registry)
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}
