//! The poll cycle and the thread that runs it.
//!
//! One `Monitor` owns one `MonitorState`. `poll_once` performs a single
//! Checking step and everything it leads to, then reports how long to sleep.
//! `run` repeats that until cancelled; `spawn` does the same on a named thread.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::detector;
use crate::dispatch::{DispatchConfig, DispatchPolicy, DispatchRecord, TracingNotifier};
use crate::entry::LogEntry;
use crate::error::{WardenError, WardenResult, WatchError};
use crate::reader::{WindowedReader, DEFAULT_WINDOW};
use crate::time::{Clock, SystemClock};
use crate::trigger::{InvocationContext, TriggerRegistry};

use super::backoff::{LinearBackoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use super::signal::{CancelToken, LoadSignal};
use super::state::{MonitorPhase, MonitorState};

/// Name of the monitor thread.
pub const MONITOR_THREAD_NAME: &str = "logwarden-monitor";

/// Runtime settings for one monitoring session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// The log file to watch.
    pub log_path: PathBuf,
    /// Application data directory handed to callbacks.
    pub app_dir: Option<PathBuf>,
    /// How far back a windowed read looks.
    pub window: Duration,
    /// Poll interval and first backoff step.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
    /// Cooldowns.
    pub dispatch: DispatchConfig,
}

impl MonitorConfig {
    /// Default settings for `log_path`.
    #[must_use]
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            app_dir: None,
            window: DEFAULT_WINDOW,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            dispatch: DispatchConfig::default(),
        }
    }
}

/// What one poll did.
#[derive(Debug, Clone)]
pub struct PollReport {
    /// Phase the poll ended in.
    pub phase: MonitorPhase,
    /// How long to sleep before the next poll.
    pub delay: Duration,
    /// Dispatch outcomes, oldest entry first.
    pub dispatched: Vec<DispatchRecord>,
}

impl PollReport {
    fn idle(phase: MonitorPhase, delay: Duration) -> Self {
        Self {
            phase,
            delay,
            dispatched: Vec::new(),
        }
    }
}

/// A single monitoring session.
pub struct Monitor {
    config: MonitorConfig,
    registry: Arc<TriggerRegistry>,
    policy: Arc<DispatchPolicy>,
    clock: Arc<dyn Clock>,
    reader: WindowedReader,
    backoff: LinearBackoff,
    state: MonitorState,
    loaded: LoadSignal,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .field("reader", &self.reader)
            .field("backoff", &self.backoff)
            .field("state", &self.state)
            .field("loaded", &self.loaded)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Creates a session on the system clock with a tracing notifier.
    #[must_use]
    pub fn new(config: MonitorConfig, registry: Arc<TriggerRegistry>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let policy = Arc::new(DispatchPolicy::new(
            config.dispatch.clone(),
            Arc::new(TracingNotifier),
            Arc::clone(&clock),
        ));
        Self::with_parts(config, registry, policy, clock)
    }

    /// Creates a session from explicit collaborators.
    ///
    /// `config.dispatch` is ignored here; `policy` carries its own cooldowns.
    #[must_use]
    pub fn with_parts(
        config: MonitorConfig,
        registry: Arc<TriggerRegistry>,
        policy: Arc<DispatchPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let reader = WindowedReader::new(config.window, Arc::clone(&clock));
        let backoff = LinearBackoff::new(config.base_delay, config.max_delay);
        Self {
            config,
            registry,
            policy,
            clock,
            reader,
            backoff,
            state: MonitorState::default(),
            loaded: LoadSignal::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Settings this session runs with.
    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Signal set after the initial load.
    #[must_use]
    pub fn load_signal(&self) -> LoadSignal {
        self.loaded.clone()
    }

    /// Runs one poll cycle.
    pub fn poll_once(&mut self) -> PollReport {
        self.state.phase = MonitorPhase::Checking;
        let path = self.config.log_path.clone();

        let modified = match detector::last_modified(&path) {
            Ok(Some(modified)) => modified,
            Ok(None) => return self.back_off(&path, None),
            Err(e) => return self.back_off(&path, Some(&e)),
        };
        if modified <= self.state.last_modified_seen {
            self.state.consecutive_failures = 0;
            self.state.phase = MonitorPhase::Unchanged;
            return PollReport::idle(MonitorPhase::Unchanged, self.backoff.base());
        }

        self.state.phase = MonitorPhase::Loading;
        match self.reader.read(&path) {
            Ok(entries) => self.load(modified, &entries),
            Err(e) => self.back_off(&path, Some(&e)),
        }
    }

    /// Polls until `cancel` fires, sleeping between polls.
    pub fn run(&mut self, cancel: &CancelToken) {
        info!(path = %self.config.log_path.display(), "monitor started");
        while !cancel.is_cancelled() {
            let report = self.poll_once();
            if !cancel.sleep(report.delay) {
                break;
            }
        }
        self.state.phase = MonitorPhase::Stopped;
        info!(path = %self.config.log_path.display(), "monitor stopped");
    }

    /// Moves the session onto its own thread.
    ///
    /// # Errors
    ///
    /// `WardenError::Internal` if the thread cannot be spawned.
    pub fn spawn(mut self) -> WardenResult<MonitorHandle> {
        let cancel = CancelToken::new();
        let loaded = self.load_signal();
        let thread_cancel = cancel.clone();

        let join = thread::Builder::new()
            .name(MONITOR_THREAD_NAME.to_string())
            .spawn(move || {
                self.run(&thread_cancel);
                self.state
            })
            .map_err(|e| WardenError::internal(format!("failed to spawn monitor thread: {e}")))?;

        Ok(MonitorHandle {
            cancel,
            loaded,
            join: Some(join),
        })
    }

    fn back_off(&mut self, path: &Path, error: Option<&WatchError>) -> PollReport {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        let failures = self.state.consecutive_failures;
        let delay = self.backoff.delay(failures);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);

        match error {
            Some(e) => warn!(
                path = %path.display(),
                error = %e,
                failures,
                delay_ms,
                "log file unreadable"
            ),
            None if failures == 1 => info!(path = %path.display(), delay_ms, "log file absent"),
            None => debug!(path = %path.display(), failures, delay_ms, "log file still absent"),
        }

        self.state.phase = MonitorPhase::Backoff;
        PollReport::idle(MonitorPhase::Backoff, delay)
    }

    fn load(&mut self, modified: DateTime<Utc>, newest_first: &[LogEntry]) -> PollReport {
        self.state.last_modified_seen = modified;
        self.state.consecutive_failures = 0;
        let delay = self.backoff.base();

        if newest_first.is_empty() {
            debug!(path = %self.config.log_path.display(), "no entries inside the window");
            return PollReport::idle(MonitorPhase::Loading, delay);
        }

        if !self.state.is_loaded() {
            self.state.establish_baseline(newest_first);
            self.state.phase = MonitorPhase::InitialLoad;
            if let Some(last) = &self.state.last_seen_entry {
                info!(
                    entries = newest_first.len(),
                    last_seen = %last.timestamp(),
                    "initial load complete"
                );
            }
            self.loaded.set();
            return PollReport::idle(MonitorPhase::InitialLoad, delay);
        }

        self.state.phase = MonitorPhase::Dispatching;
        let fresh = self.state.take_new(newest_first);
        let mut dispatched = Vec::new();
        for entry in fresh {
            let trigger = self.registry.resolve(entry.message());
            if trigger.is_catch_all() {
                debug!(timestamp = %entry.timestamp(), "no trigger matched");
                continue;
            }

            info!(
                trigger = %trigger.name(),
                timestamp = %entry.timestamp(),
                level = %entry.level(),
                "trigger detected"
            );
            let ctx = InvocationContext {
                trigger: trigger.name().to_string(),
                entry,
                log_path: self.config.log_path.clone(),
                app_dir: self.config.app_dir.clone(),
                detected_at: self.clock.utc_now(),
            };
            dispatched.push(self.policy.dispatch(&trigger, &ctx));
        }

        PollReport {
            phase: MonitorPhase::Dispatching,
            delay,
            dispatched,
        }
    }
}

/// Handle to a monitor running on its own thread.
///
/// Dropping the handle cancels the monitor without waiting for it.
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: CancelToken,
    loaded: LoadSignal,
    join: Option<JoinHandle<MonitorState>>,
}

impl MonitorHandle {
    /// Token that stops the monitor. Safe to call from any thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Signal set after the initial load.
    #[must_use]
    pub fn load_signal(&self) -> LoadSignal {
        self.loaded.clone()
    }

    /// True while the monitor thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// Cancels the monitor and waits for it to exit.
    ///
    /// # Errors
    ///
    /// `WardenError::Internal` if the monitor thread panicked.
    pub fn stop(self) -> WardenResult<MonitorState> {
        self.cancel.cancel();
        self.join()
    }

    /// Waits for the monitor to exit without cancelling it.
    ///
    /// # Errors
    ///
    /// `WardenError::Internal` if the monitor thread panicked.
    pub fn join(mut self) -> WardenResult<MonitorState> {
        let handle = self
            .join
            .take()
            .ok_or_else(|| WardenError::internal("monitor thread already joined"))?;
        handle
            .join()
            .map_err(|_| WardenError::internal("monitor thread panicked"))
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;
    use tempfile::{tempdir, TempDir};

    use crate::dispatch::{CallbackStatus, Notifier};
    use crate::time::ManualClock;
    use crate::trigger::SharedCallback;

    struct Quiet;

    impl Notifier for Quiet {
        fn notify(&self, _reason: &str) -> bool {
            true
        }
    }

    struct Harness {
        _dir: TempDir,
        path: PathBuf,
        clock: Arc<ManualClock>,
        monitor: Monitor,
        hits: Arc<AtomicUsize>,
    }

    fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let start = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 30, 0)
            .unwrap();
        let clock = Arc::new(ManualClock::new(start));

        let registry = Arc::new(TriggerRegistry::builtin());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let callback: SharedCallback = Arc::new(move |_: &InvocationContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        registry.register("CORRUPT_SCHEMA", callback).unwrap();

        let config = MonitorConfig::new(&path);
        let policy = Arc::new(DispatchPolicy::new(
            config.dispatch.clone(),
            Arc::new(Quiet),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let monitor =
            Monitor::with_parts(config, registry, policy, Arc::clone(&clock) as Arc<dyn Clock>);

        Harness {
            _dir: dir,
            path,
            clock,
            monitor,
            hits,
        }
    }

    fn append(path: &Path, line: &str) {
        let mut f = OpenOptions::new().create(true).append(true).open(path).unwrap();
        writeln!(f, "{line}").unwrap();
    }

    /// Forces the next poll to see a change even on coarse-mtime filesystems.
    fn mark_stale(monitor: &mut Monitor) {
        monitor.state.last_modified_seen = DateTime::<Utc>::from(std::time::UNIX_EPOCH);
    }

    #[test]
    fn absent_file_backs_off_and_resets() {
        let mut h = harness();

        let delays: Vec<u64> = (0..3).map(|_| h.monitor.poll_once().delay.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 3]);
        assert_eq!(h.monitor.state().consecutive_failures, 3);

        append(&h.path, "2025-01-01 00:00:00,000 INFO hello");
        let report = h.monitor.poll_once();
        assert_eq!(report.phase, MonitorPhase::InitialLoad);
        assert_eq!(report.delay, Duration::from_secs(1));
        assert_eq!(h.monitor.state().consecutive_failures, 0);

        // One success is enough to drop back to the base delay.
        fs::remove_file(&h.path).unwrap();
        let delays: Vec<u64> = (0..2).map(|_| h.monitor.poll_once().delay.as_secs()).collect();
        assert_eq!(delays, vec![1, 2]);
    }

    #[test]
    fn detections_are_stamped_from_the_session_clock() {
        let mut h = harness();
        append(&h.path, "2025-01-01 00:00:00,000 INFO hello");
        h.monitor.poll_once();

        append(&h.path, "2025-01-01 00:00:01,000 ERROR init schema: error: Internal error");
        mark_stale(&mut h.monitor);
        let report = h.monitor.poll_once();
        assert_eq!(report.dispatched.len(), 1);
        assert_eq!(report.dispatched[0].detected_at, h.clock.utc_now());
    }

    #[test]
    fn panicking_notifier_does_not_stop_polling() {
        struct Broken;

        impl Notifier for Broken {
            fn notify(&self, _reason: &str) -> bool {
                panic!("notification service unavailable")
            }
        }

        let h = harness();
        let clock = Arc::clone(&h.clock) as Arc<dyn Clock>;
        let config = MonitorConfig::new(&h.path);
        let policy = Arc::new(DispatchPolicy::new(
            config.dispatch.clone(),
            Arc::new(Broken),
            Arc::clone(&clock),
        ));
        let registry = Arc::clone(&h.monitor.registry);
        let mut monitor = Monitor::with_parts(config, registry, policy, clock);

        append(&h.path, "2025-01-01 00:00:00,000 INFO hello");
        monitor.poll_once();

        append(&h.path, "2025-01-01 00:00:01,000 ERROR init schema: error: Internal error");
        mark_stale(&mut monitor);
        let report = monitor.poll_once();
        assert_eq!(report.dispatched.len(), 1);
        assert!(!report.dispatched[0].notified);
        assert_eq!(report.dispatched[0].callback, CallbackStatus::Invoked);

        append(&h.path, "2025-01-01 00:00:02,000 INFO still running");
        mark_stale(&mut monitor);
        assert_eq!(monitor.poll_once().phase, MonitorPhase::Dispatching);
        assert_eq!(monitor.state().consecutive_failures, 0);
    }

    #[test]
    fn initial_load_never_dispatches() {
        let mut h = harness();
        append(&h.path, "2025-01-01 00:00:00,000 ERROR init schema: error: Internal error");

        let report = h.monitor.poll_once();
        assert_eq!(report.phase, MonitorPhase::InitialLoad);
        assert!(report.dispatched.is_empty());
        assert_eq!(h.hits.load(Ordering::SeqCst), 0);
        assert!(h.monitor.load_signal().is_set());
    }

    #[test]
    fn unchanged_file_sleeps_base_delay() {
        let mut h = harness();
        append(&h.path, "2025-01-01 00:00:00,000 INFO hello");
        h.monitor.poll_once();

        let report = h.monitor.poll_once();
        assert_eq!(report.phase, MonitorPhase::Unchanged);
        assert_eq!(report.delay, Duration::from_secs(1));
    }

    #[test]
    fn new_trigger_line_dispatches_once() {
        let mut h = harness();
        append(&h.path, "2025-01-01 00:00:00,000 INFO hello");
        h.monitor.poll_once();

        append(&h.path, "2025-01-01 00:00:01,000 ERROR init schema: error: Internal error");
        mark_stale(&mut h.monitor);
        let report = h.monitor.poll_once();
        assert_eq!(report.phase, MonitorPhase::Dispatching);
        assert_eq!(report.dispatched.len(), 1);
        assert_eq!(report.dispatched[0].trigger, "CORRUPT_SCHEMA");
        assert_eq!(report.dispatched[0].callback, CallbackStatus::Invoked);

        // Re-reading the same content dispatches nothing.
        mark_stale(&mut h.monitor);
        assert!(h.monitor.poll_once().dispatched.is_empty());
        assert_eq!(h.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_messages_are_not_dispatched() {
        let mut h = harness();
        append(&h.path, "2025-01-01 00:00:00,000 INFO hello");
        h.monitor.poll_once();

        append(&h.path, "2025-01-01 00:00:01,000 ERROR something else broke");
        mark_stale(&mut h.monitor);
        let report = h.monitor.poll_once();
        assert_eq!(report.phase, MonitorPhase::Dispatching);
        assert!(report.dispatched.is_empty());
        assert_eq!(
            h.monitor.state().last_seen_entry.as_ref().unwrap().message(),
            "something else broke"
        );
    }

    #[test]
    fn directory_path_is_a_transient_failure() {
        let mut h = harness();
        fs::create_dir(&h.path).unwrap();

        let report = h.monitor.poll_once();
        assert_eq!(report.phase, MonitorPhase::Backoff);
        assert_eq!(h.monitor.state().consecutive_failures, 1);
        assert!(!h.monitor.state().is_loaded());

        // The change was not committed, so the next poll retries the read.
        let report = h.monitor.poll_once();
        assert_eq!(report.phase, MonitorPhase::Backoff);
        assert_eq!(report.delay, Duration::from_secs(2));
    }

    #[test]
    fn entries_outside_window_are_ignored() {
        let mut h = harness();
        h.clock.advance(Duration::from_secs(3 * 3600));
        append(&h.path, "2025-01-01 00:00:00,000 INFO too old");

        let report = h.monitor.poll_once();
        assert_eq!(report.phase, MonitorPhase::Loading);
        assert!(!h.monitor.state().is_loaded());
    }

    #[test]
    fn run_stops_when_cancelled() {
        let h = harness();
        let mut monitor = h.monitor;
        let cancel = CancelToken::new();
        cancel.cancel();
        monitor.run(&cancel);
        assert_eq!(monitor.state().phase, MonitorPhase::Stopped);
    }
}
