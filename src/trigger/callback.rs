//! The callback seam between the monitor and remediation actions.
//!
//! Remediation itself (killing processes, deleting profile directories,
//! clearing browser storage) lives outside this crate. The monitor only hands
//! each action an `InvocationContext` and records whether it failed.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::entry::LogEntry;
use crate::error::CallbackError;

/// Everything a remediation action gets to see about one detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    /// Name of the trigger that matched.
    pub trigger: String,
    /// The log entry that matched.
    pub entry: LogEntry,
    /// The file being monitored.
    pub log_path: PathBuf,
    /// Application data directory the remediation operates on, if configured.
    pub app_dir: Option<PathBuf>,
    /// When the monitor detected the entry.
    pub detected_at: DateTime<Utc>,
}

/// A remediation action bound to a trigger.
///
/// Callbacks run synchronously on the monitor thread. One that blocks stalls
/// detection of every later entry, so long work belongs on another thread.
pub trait TriggerCallback: Send + Sync {
    /// Runs the action.
    ///
    /// # Errors
    ///
    /// Any `CallbackError`; the monitor logs it and keeps running.
    fn invoke(&self, ctx: &InvocationContext) -> Result<(), CallbackError>;
}

impl<F> TriggerCallback for F
where
    F: Fn(&InvocationContext) -> Result<(), CallbackError> + Send + Sync,
{
    fn invoke(&self, ctx: &InvocationContext) -> Result<(), CallbackError> {
        self(ctx)
    }
}

/// Shared handle to a registered callback.
pub type SharedCallback = Arc<dyn TriggerCallback>;
