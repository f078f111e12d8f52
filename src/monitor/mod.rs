//! MONITOR subsystem: the polling loop that tails the log file.
//!
//! Each poll checks the file's modification time, reads the time window when
//! it changed, and hands entries newer than the last one seen to the trigger
//! registry and dispatch policy. A missing or unreadable file backs off
//! linearly. The loop runs on a dedicated thread and stops cooperatively.

/// Linear backoff delays.
pub mod backoff;
/// Poll cycle, run loop and thread handle.
pub mod session;
/// Cancellation and initial-load signals.
pub mod signal;
/// Loop state and phases.
pub mod state;

pub use backoff::LinearBackoff;
pub use session::{Monitor, MonitorConfig, MonitorHandle, PollReport, MONITOR_THREAD_NAME};
pub use signal::{CancelToken, LoadSignal};
pub use state::{MonitorPhase, MonitorState};
