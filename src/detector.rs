//! Change detection for the watched log file.
//!
//! "File absent" and "file present but unchanged" must stay distinguishable,
//! since only absence drives backoff.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::WatchError;

/// Returns the modification time of `path`, or `None` if it does not exist.
///
/// # Errors
///
/// `WatchError::Io` for metadata failures other than `NotFound`, or when the
/// platform cannot report a modification time.
pub fn last_modified(path: &Path) -> Result<Option<DateTime<Utc>>, WatchError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(WatchError::io(path, e)),
    };

    let modified = metadata.modified().map_err(|e| WatchError::io(path, e))?;
    Ok(Some(DateTime::<Utc>::from(modified)))
}
