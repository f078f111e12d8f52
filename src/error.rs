//! Error types for logwarden.
//!
//! All errors are strongly typed using thiserror. None of them is fatal to a
//! running monitor: parse errors drop a single line, watch errors trigger
//! backoff, and callback errors are logged and swallowed by the dispatcher.

use std::path::PathBuf;

use thiserror::Error;

/// A single log line could not be turned into a `LogEntry`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected at least 4 space-separated fields, found {found}: {line:?}")]
    TooFewFields {
        found: usize,
        line: String,
    },

    #[error("invalid timestamp {raw:?}: {reason}")]
    InvalidTimestamp {
        raw: String,
        reason: String,
    },
}

/// Unexpected I/O failure while probing or reading the watched file.
///
/// A missing file is not represented here; callers see `Ok(None)` or an
/// empty read instead.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Trigger registration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("trigger '{name}' is already defined")]
    DuplicateTrigger {
        name: String,
    },

    #[error("trigger '{name}' is not defined")]
    UnknownTrigger {
        name: String,
    },

    #[error("trigger name '{name}' is reserved for the catch-all trigger")]
    ReservedName {
        name: String,
    },

    #[error("trigger '{name}' has an empty match substring")]
    EmptySubstring {
        name: String,
    },
}

/// A remediation callback failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("callback failed: {message}")]
    Failed {
        message: String,
    },

    #[error("callback panicked: {message}")]
    Panicked {
        message: String,
    },
}

impl CallbackError {
    /// Creates a `Failed` error.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid {
        field: String,
        reason: String,
    },
}

/// Top-level error type for logwarden.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Callback error: {0}")]
    Callback(#[from] CallbackError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl WardenError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the condition clears on its own (the monitor retries it).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Watch(_))
    }
}

/// Result type alias for logwarden operations.
pub type WardenResult<T> = Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_errors_are_transient() {
        let err: WardenError = WatchError::io(
            "/tmp/app.log",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        )
        .into();
        assert!(err.is_transient());
        assert!(err.to_string().contains("/tmp/app.log"));
    }

    #[test]
    fn registry_errors_are_not_transient() {
        let err: WardenError = RegistryError::UnknownTrigger {
            name: "NOPE".to_string(),
        }
        .into();
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Registry error: trigger 'NOPE' is not defined");
    }

    #[test]
    fn callback_error_helper_builds_failed_variant() {
        assert_eq!(
            CallbackError::failed("boom"),
            CallbackError::Failed {
                message: "boom".to_string()
            }
        );
    }
}
