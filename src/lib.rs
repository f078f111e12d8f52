//! # logwarden - incremental log tailer with remediation triggers
//!
//! logwarden watches an append-only application log, picks out lines that
//! carry known failure markers, and runs one remediation callback per failure
//! while rate-limiting both callbacks and user notifications.
//!
//! ## Core Concepts
//!
//! - **LogEntry**: one parsed line (`YYYY-MM-DD HH:MM:SS,mmm LEVEL message`)
//! - **Windowed read**: a reverse scan of the file bounded by a time cutoff
//! - **Trigger**: a named literal substring with an optional callback
//! - **Dispatch policy**: independent notification and callback cooldowns
//! - **Monitor**: the polling loop, with linear backoff while the file is missing
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use logwarden::{CallbackError, InvocationContext, Monitor, MonitorConfig, TriggerRegistry};
//!
//! let registry = Arc::new(TriggerRegistry::builtin());
//! registry.register(
//!     "CORRUPT_SCHEMA",
//!     Arc::new(|ctx: &InvocationContext| -> Result<(), CallbackError> {
//!         println!("resetting after {}", ctx.entry);
//!         Ok(())
//!     }),
//! )?;
//!
//! let handle = Monitor::new(MonitorConfig::new("app.log"), registry).spawn()?;
//! // ...
//! let state = handle.stop()?;
//! println!("stopped in phase {}", state.phase);
//! # Ok::<(), logwarden::WardenError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Parsing and reading
pub mod detector;
pub mod entry;
pub mod error;
pub mod reader;
pub mod time;

// Matching and dispatch
pub mod dispatch;
pub mod trigger;

// Polling loop and configuration
pub mod config;
pub mod monitor;

#[cfg(feature = "cli")]
pub mod logging;

// Re-export primary types at crate root for convenience
pub use config::{TriggerSpec, WardenConfig};
pub use dispatch::{
	CallbackStatus, Cooldown, DispatchConfig, DispatchPolicy, DispatchRecord, Notifier,
	TracingNotifier,
};
pub use entry::{LogEntry, LogLevel};
pub use error::{
	CallbackError, ConfigError, ParseError, RegistryError, WardenError, WardenResult, WatchError,
};
pub use monitor::{
	CancelToken, LinearBackoff, LoadSignal, Monitor, MonitorConfig, MonitorHandle, MonitorPhase,
	MonitorState, PollReport,
};
pub use reader::{discard_older_than, discard_where, WindowedReader};
pub use time::{Clock, ManualClock, SystemClock};
pub use trigger::{
	InvocationContext, SharedCallback, TriggerCallback, TriggerDefinition, TriggerRegistry,
	BUILTIN_TRIGGERS, UNKNOWN_TRIGGER,
};
