use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{Local, NaiveDate};
use tempfile::{tempdir, TempDir};

use logwarden::time::format_timestamp;
use logwarden::{
    CallbackError, CallbackStatus, Clock, DispatchConfig, DispatchPolicy, InvocationContext,
    ManualClock, Monitor, MonitorConfig, MonitorPhase, Notifier, SharedCallback, TriggerRegistry,
};

const SCHEMA_ERROR: &str = "ERROR [Console] init schema: error: Internal error";

struct CountingNotifier(AtomicUsize);

impl Notifier for CountingNotifier {
    fn notify(&self, _reason: &str) -> bool {
        self.0.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Appends lines and pushes the mtime forward so every append is visible
/// regardless of filesystem timestamp granularity.
struct LogFile {
    path: PathBuf,
    mtime: SystemTime,
}

impl LogFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            mtime: SystemTime::now(),
        }
    }

    fn append<S: AsRef<str>>(&mut self, lines: &[S]) {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .unwrap();
        for line in lines {
            writeln!(f, "{}", line.as_ref()).unwrap();
        }
        self.mtime += Duration::from_secs(1);
        f.set_modified(self.mtime).unwrap();
    }
}

fn counting_callback(hits: &Arc<AtomicUsize>) -> SharedCallback {
    let hits = Arc::clone(hits);
    Arc::new(move |_: &InvocationContext| -> Result<(), CallbackError> {
        hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn manual_monitor(
    path: &Path,
    registry: Arc<TriggerRegistry>,
    clock: &Arc<ManualClock>,
    notifier: Arc<CountingNotifier>,
) -> Monitor {
    let config = MonitorConfig::new(path);
    let policy = Arc::new(DispatchPolicy::new(
        config.dispatch.clone(),
        notifier,
        Arc::clone(clock) as Arc<dyn Clock>,
    ));
    Monitor::with_parts(config, registry, policy, Arc::clone(clock) as Arc<dyn Clock>)
}

fn setup() -> (TempDir, Arc<ManualClock>) {
    let dir = tempdir().unwrap();
    let now = NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .and_hms_opt(0, 10, 0)
        .unwrap();
    (dir, Arc::new(ManualClock::new(now)))
}

#[test]
fn absent_then_initial_load_then_dispatch_with_cooldown() {
    let (dir, clock) = setup();
    let mut log = LogFile::new(dir.path().join("app.log"));

    let registry = Arc::new(TriggerRegistry::builtin());
    let hits = Arc::new(AtomicUsize::new(0));
    registry
        .register("CORRUPT_SCHEMA", counting_callback(&hits))
        .unwrap();
    let notifier = Arc::new(CountingNotifier(AtomicUsize::new(0)));
    let mut monitor = manual_monitor(&log.path, registry, &clock, Arc::clone(&notifier));
    assert_eq!(monitor.state().phase, MonitorPhase::Idle);

    // Missing file: linear backoff capped at 10s.
    let mut delays = Vec::new();
    for _ in 0..12 {
        let report = monitor.poll_once();
        assert_eq!(report.phase, MonitorPhase::Backoff);
        delays.push(report.delay.as_secs());
        clock.advance(report.delay);
    }
    assert_eq!(delays, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 10, 10]);

    // File appears: baseline only.
    log.append(&["2025-01-01 00:00:00,000 INFO hello"]);
    let report = monitor.poll_once();
    assert_eq!(report.phase, MonitorPhase::InitialLoad);
    assert_eq!(report.delay, Duration::from_secs(1));
    assert!(report.dispatched.is_empty());
    let last = monitor.state().last_seen_entry.clone().unwrap();
    assert_eq!(format_timestamp(&last.timestamp()), "2025-01-01 00:00:00,000");
    assert_eq!(monitor.state().consecutive_failures, 0);
    assert!(monitor.load_signal().is_set());
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // Nothing new.
    assert_eq!(monitor.poll_once().phase, MonitorPhase::Unchanged);

    // One trigger line: exactly one callback.
    log.append(&[format!("2025-01-01 00:00:01,000 {SCHEMA_ERROR}")]);
    let report = monitor.poll_once();
    assert_eq!(report.phase, MonitorPhase::Dispatching);
    assert_eq!(report.dispatched.len(), 1);
    assert_eq!(report.dispatched[0].trigger, "CORRUPT_SCHEMA");
    assert_eq!(report.dispatched[0].callback, CallbackStatus::Invoked);
    assert!(report.dispatched[0].notified);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Past the callback cooldown, a burst of three within one second: only
    // the first runs the callback.
    clock.advance(Duration::from_secs(16));
    log.append(&[
        format!("2025-01-01 00:00:17,100 {SCHEMA_ERROR}"),
        format!("2025-01-01 00:00:17,400 {SCHEMA_ERROR}"),
        format!("2025-01-01 00:00:17,900 {SCHEMA_ERROR}"),
    ]);
    let report = monitor.poll_once();
    let statuses: Vec<CallbackStatus> =
        report.dispatched.iter().map(|r| r.callback.clone()).collect();
    assert_eq!(
        statuses,
        vec![
            CallbackStatus::Invoked,
            CallbackStatus::Suppressed,
            CallbackStatus::Suppressed
        ]
    );
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    // 16s after the first notification the 30s window still holds.
    assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    assert_eq!(
        format_timestamp(&monitor.state().last_seen_entry.as_ref().unwrap().timestamp()),
        "2025-01-01 00:00:17,900"
    );
}

#[test]
fn burst_inside_cooldown_runs_nothing() {
    let (dir, clock) = setup();
    let mut log = LogFile::new(dir.path().join("app.log"));

    let registry = Arc::new(TriggerRegistry::builtin());
    let hits = Arc::new(AtomicUsize::new(0));
    registry
        .register("CORRUPT_SCHEMA", counting_callback(&hits))
        .unwrap();
    let notifier = Arc::new(CountingNotifier(AtomicUsize::new(0)));
    let mut monitor = manual_monitor(&log.path, registry, &clock, notifier);

    log.append(&["2025-01-01 00:00:00,000 INFO hello"]);
    monitor.poll_once();

    log.append(&[
        format!("2025-01-01 00:00:01,000 {SCHEMA_ERROR}"),
        format!("2025-01-01 00:00:01,200 {SCHEMA_ERROR}"),
    ]);
    let report = monitor.poll_once();
    assert_eq!(report.dispatched.len(), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_millis(500));
    log.append(&[format!("2025-01-01 00:00:01,700 {SCHEMA_ERROR}")]);
    let report = monitor.poll_once();
    assert_eq!(report.dispatched[0].callback, CallbackStatus::Suppressed);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn earlier_declared_trigger_wins_ties() {
    let (dir, clock) = setup();
    let mut log = LogFile::new(dir.path().join("app.log"));

    let registry = Arc::new(TriggerRegistry::new());
    registry.define("ERR", "ERR").unwrap();
    registry.define("ERR1", "ERR1").unwrap();
    let notifier = Arc::new(CountingNotifier(AtomicUsize::new(0)));
    let mut monitor = manual_monitor(&log.path, registry, &clock, notifier);

    log.append(&["2025-01-01 00:00:00,000 INFO hello"]);
    monitor.poll_once();
    log.append(&["2025-01-01 00:00:01,000 ERROR code ERR1 raised"]);

    let report = monitor.poll_once();
    assert_eq!(report.dispatched.len(), 1);
    assert_eq!(report.dispatched[0].trigger, "ERR");
    assert_eq!(report.dispatched[0].callback, CallbackStatus::Unbound);
}

#[test]
fn malformed_lines_are_skipped_not_fatal() {
    let (dir, clock) = setup();
    let mut log = LogFile::new(dir.path().join("app.log"));

    let registry = Arc::new(TriggerRegistry::builtin());
    let hits = Arc::new(AtomicUsize::new(0));
    registry
        .register("CORRUPT_SCHEMA", counting_callback(&hits))
        .unwrap();
    let notifier = Arc::new(CountingNotifier(AtomicUsize::new(0)));
    let mut monitor = manual_monitor(&log.path, registry, &clock, notifier);

    log.append(&["2025-01-01 00:00:00,000 INFO hello"]);
    monitor.poll_once();

    log.append(&[
        "garbage".to_string(),
        format!("2025-01-01 00:00:02,000 {SCHEMA_ERROR}"),
        "2025-13-01 00:00:03,000 INFO bad month".to_string(),
        String::new(),
    ]);
    let report = monitor.poll_once();
    assert_eq!(report.dispatched.len(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn rotation_to_older_content_dispatches_nothing() {
    let (dir, clock) = setup();
    let mut log = LogFile::new(dir.path().join("app.log"));

    let registry = Arc::new(TriggerRegistry::builtin());
    let hits = Arc::new(AtomicUsize::new(0));
    registry
        .register("CORRUPT_SCHEMA", counting_callback(&hits))
        .unwrap();
    let notifier = Arc::new(CountingNotifier(AtomicUsize::new(0)));
    let mut monitor = manual_monitor(&log.path, registry, &clock, notifier);

    log.append(&["2025-01-01 00:00:05,000 INFO hello"]);
    monitor.poll_once();

    // The file is replaced by one whose lines predate the boundary.
    fs::remove_file(&log.path).unwrap();
    assert_eq!(monitor.poll_once().phase, MonitorPhase::Backoff);
    log.append(&[format!("2025-01-01 00:00:01,000 {SCHEMA_ERROR}")]);

    let report = monitor.poll_once();
    assert_eq!(report.phase, MonitorPhase::Dispatching);
    assert!(report.dispatched.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn spawned_monitor_detects_and_stops() {
    let dir = tempdir().unwrap();
    let mut log = LogFile::new(dir.path().join("app.log"));
    let now = Local::now().naive_local();
    log.append(&[format!("{} INFO started", format_timestamp(&now))]);

    let registry = Arc::new(TriggerRegistry::builtin());
    let hits = Arc::new(AtomicUsize::new(0));
    registry
        .register("CORRUPT_SCHEMA", counting_callback(&hits))
        .unwrap();

    let mut config = MonitorConfig::new(&log.path);
    config.base_delay = Duration::from_millis(20);
    config.max_delay = Duration::from_millis(100);
    config.dispatch = DispatchConfig {
        notify_cooldown: Duration::from_secs(30),
        callback_cooldown: Duration::from_secs(15),
    };
    let handle = Monitor::new(config, registry).spawn().unwrap();
    assert!(handle.load_signal().wait_timeout(Duration::from_secs(5)));
    assert!(handle.is_running());

    let later = now + chrono::Duration::seconds(1);
    log.append(&[format!("{} {SCHEMA_ERROR}", format_timestamp(&later))]);

    let deadline = Instant::now() + Duration::from_secs(5);
    while hits.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let state = handle.stop().unwrap();
    assert_eq!(state.phase, MonitorPhase::Stopped);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn cancellation_interrupts_long_backoff() {
    let dir = tempdir().unwrap();
    let mut config = MonitorConfig::new(dir.path().join("never.log"));
    config.base_delay = Duration::from_secs(30);
    config.max_delay = Duration::from_secs(60);

    let handle = Monitor::new(config, Arc::new(TriggerRegistry::builtin()))
        .spawn()
        .unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let state = handle.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(state.phase, MonitorPhase::Stopped);
    assert!(state.consecutive_failures >= 1);
    assert!(state.last_seen_entry.is_none());
}

#[test]
fn unreadable_path_keeps_retrying() {
    let (dir, clock) = setup();
    let path = dir.path().join("app.log");
    fs::create_dir(&path).unwrap();
    File::create(path.join("inner")).unwrap();

    let notifier = Arc::new(CountingNotifier(AtomicUsize::new(0)));
    let mut monitor = manual_monitor(&path, Arc::new(TriggerRegistry::builtin()), &clock, notifier);
    let delays: Vec<u64> = (0..3).map(|_| monitor.poll_once().delay.as_secs()).collect();
    assert_eq!(delays, vec![1, 2, 3]);
    assert_eq!(monitor.state().phase, MonitorPhase::Backoff);
}
