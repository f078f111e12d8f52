//! Mutable state owned by one monitor loop.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::entry::LogEntry;

/// Where the loop is in its poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    /// Before the first poll.
    Idle,
    /// Querying the modification time.
    Checking,
    /// File absent or unreadable; sleeping an increasing delay.
    Backoff,
    /// Nothing new; sleeping the base delay.
    Unchanged,
    /// File changed; reading the window.
    Loading,
    /// First successful read; baseline established, nothing dispatched.
    InitialLoad,
    /// Later read; new entries resolved and dispatched.
    Dispatching,
    /// Cancelled. Terminal.
    Stopped,
}

impl MonitorPhase {
    /// Lower-case name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Backoff => "backoff",
            Self::Unchanged => "unchanged",
            Self::Loading => "loading",
            Self::InitialLoad => "initial_load",
            Self::Dispatching => "dispatching",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session progress. Only the monitor loop writes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorState {
    /// Modification time of the last successfully read version of the file.
    pub last_modified_seen: DateTime<Utc>,
    /// Newest entry observed so far. `None` until the initial load.
    pub last_seen_entry: Option<LogEntry>,
    /// How many entries carrying `last_seen_entry`'s timestamp have been seen.
    pub boundary_seen: usize,
    /// Consecutive absent/failed polls. Reset by any successful read.
    pub consecutive_failures: u32,
    /// Current phase.
    pub phase: MonitorPhase,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            last_modified_seen: DateTime::<Utc>::from(std::time::UNIX_EPOCH),
            last_seen_entry: None,
            boundary_seen: 0,
            consecutive_failures: 0,
            phase: MonitorPhase::Idle,
        }
    }
}

impl MonitorState {
    /// True once the initial load has happened.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.last_seen_entry.is_some()
    }

    /// Selects the entries not seen before from a newest-first read and
    /// advances the boundary past them. Returns them oldest first.
    ///
    /// Entries older than the boundary timestamp are dropped. At the boundary
    /// timestamp the first `boundary_seen` entries (oldest first) count as
    /// already seen, so lines appended within the same millisecond are still
    /// picked up while the boundary entry itself never repeats.
    pub fn take_new(&mut self, newest_first: &[LogEntry]) -> Vec<LogEntry> {
        let Some(last) = self.last_seen_entry.as_ref() else {
            return Vec::new();
        };
        let boundary = last.timestamp();

        let mut skip_at_boundary = self.boundary_seen;
        let mut fresh = Vec::new();
        for entry in newest_first.iter().rev() {
            let ts = entry.timestamp();
            if ts < boundary {
                continue;
            }
            if ts == boundary && skip_at_boundary > 0 {
                skip_at_boundary -= 1;
                continue;
            }
            fresh.push(entry.clone());
        }

        if let Some(newest) = fresh.last() {
            let newest_ts = newest.timestamp();
            self.boundary_seen = count_at(newest_first, newest_ts);
            self.last_seen_entry = Some(newest.clone());
        }
        fresh
    }

    /// Records the initial load: the newest entry becomes the boundary.
    pub fn establish_baseline(&mut self, newest_first: &[LogEntry]) {
        if let Some(newest) = newest_first.first() {
            self.boundary_seen = count_at(newest_first, newest.timestamp());
            self.last_seen_entry = Some(newest.clone());
        }
    }
}

fn count_at(entries: &[LogEntry], ts: NaiveDateTime) -> usize {
    entries.iter().filter(|e| e.timestamp() == ts).count()
}
