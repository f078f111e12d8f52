//! Time handling for log timestamps and polling.
//!
//! Log timestamps are naive local wall-clock values in the fixed
//! `YYYY-MM-DD HH:MM:SS,mmm` format. Cooldowns and backoff are measured on a
//! monotonic clock instead, so wall-clock jumps cannot stretch or skip them.
//!
//! Both readings come from a `Clock`, which lets tests drive time by hand.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// `chrono` format string for log timestamps (`2025-05-26 09:33:40,383`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current local wall-clock time, comparable with log timestamps.
    fn local_now(&self) -> NaiveDateTime;

    /// Current monotonic instant.
    fn instant(&self) -> Instant;

    /// Current absolute time, used to stamp detections.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// `advance` moves the wall clock and the monotonic clock together.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Clone, Copy)]
struct ManualState {
    local: NaiveDateTime,
    elapsed: Duration,
}

impl ManualClock {
    /// Creates a manual clock reading `local` as the current wall-clock time.
    #[must_use]
    pub fn new(local: NaiveDateTime) -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState {
                local,
                elapsed: Duration::ZERO,
            }),
        }
    }

    /// Moves both clocks forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.elapsed += by;
        state.local += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }

    /// Sets the wall clock without touching the monotonic clock.
    pub fn set_local(&self, local: NaiveDateTime) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .local = local;
    }
}

impl Clock for ManualClock {
    fn local_now(&self) -> NaiveDateTime {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).local
    }

    fn instant(&self) -> Instant {
        let elapsed = self.state.lock().unwrap_or_else(PoisonError::into_inner).elapsed;
        self.origin + elapsed
    }

    /// The manual wall clock read as UTC.
    fn utc_now(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.local_now())
    }
}

/// Formats a timestamp in the fixed log format.
#[must_use]
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}
