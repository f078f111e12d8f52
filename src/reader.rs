//! Windowed reader: the most recent slice of the log, newest first.
//!
//! The whole file is read into memory (application logs observed in the
//! field top out around 10 MB) and scanned from the last line backwards. The
//! scan stops at the first parsed entry older than the cutoff, which relies on
//! the log being append-only and chronological.
//!
//! Known limitation: a line written out of order (clock adjustment, buffered
//! writes) that is older than the cutoff ends the scan early, and entries
//! before it inside the window are not returned.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::entry::LogEntry;
use crate::error::WatchError;
use crate::time::{Clock, SystemClock};

/// Default look-back window for a windowed read.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(2 * 60 * 60);

/// Reads the recent window of a log file.
#[derive(Clone)]
pub struct WindowedReader {
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for WindowedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedReader")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl Default for WindowedReader {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, Arc::new(SystemClock))
    }
}

impl WindowedReader {
    /// Creates a reader with the given look-back window and clock.
    #[must_use]
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { window, clock }
    }

    /// The configured look-back window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Oldest timestamp a read returns right now.
    #[must_use]
    pub fn cutoff(&self) -> NaiveDateTime {
        let now = self.clock.local_now();
        chrono::Duration::from_std(self.window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(NaiveDateTime::MIN)
    }

    /// Reads `path` and returns the entries inside the window, newest first.
    ///
    /// A missing file yields an empty vector. Lines that fail to parse are
    /// skipped and the scan continues past them.
    ///
    /// # Errors
    ///
    /// `WatchError::Io` for any read failure other than the file not existing.
    pub fn read(&self, path: &Path) -> Result<Vec<LogEntry>, WatchError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "log file does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(WatchError::io(path, e)),
        };

        // A rotation or a half-flushed write can leave invalid UTF-8 near the
        // edges; those lines fail to parse and are skipped like any other.
        let text = String::from_utf8_lossy(&bytes);
        Ok(scan_newest_first(&text, self.cutoff()))
    }
}

/// Reverse-scans `text` and collects entries no older than `cutoff`.
#[must_use]
pub fn scan_newest_first(text: &str, cutoff: NaiveDateTime) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for line in text.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match LogEntry::parse(line) {
            Ok(entry) => {
                if entry.timestamp() < cutoff {
                    break;
                }
                entries.push(entry);
            }
            Err(e) => {
                skipped += 1;
                debug!(error = %e, "skipping unparseable log line");
            }
        }
    }

    if skipped > 0 {
        debug!(kept = entries.len(), skipped, "windowed scan finished");
    }
    entries
}

/// Drops every entry for which `discard` returns true.
#[must_use]
pub fn discard_where<F>(entries: Vec<LogEntry>, mut discard: F) -> Vec<LogEntry>
where
    F: FnMut(&LogEntry) -> bool,
{
    entries.into_iter().filter(|e| !discard(e)).collect()
}

/// Drops entries older than `cutoff`.
#[must_use]
pub fn discard_older_than(entries: Vec<LogEntry>, cutoff: NaiveDateTime) -> Vec<LogEntry> {
    discard_where(entries, |e| e.timestamp() < cutoff)
}
