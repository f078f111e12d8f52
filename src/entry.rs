//! Log entries and the line parser.
//!
//! A line has the fixed shape
//!
//! ```text
//! 2025-05-26 09:33:40,383 INFO JS API: getNativeVersion returned: 2023.2.208
//! ```
//!
//! i.e. date, time, level, then a free-text message that may itself contain
//! spaces. Anything else is a `ParseError` and is dropped by the reader.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::time::{format_timestamp, TIMESTAMP_FORMAT};

/// Severity of a log entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Diagnostic output.
    Debug,
    /// Normal operation. Also the fallback for unrecognised level strings.
    Info,
    /// Something unexpected that the application survived.
    Warning,
    /// A failed operation. `SEVERE` maps here.
    Error,
    /// The application is unlikely to continue.
    Critical,
}

impl LogLevel {
    /// Maps a level token to a level. Never fails: unknown tokens are `Info`.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        match token {
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARNING" | "WARN" => Self::Warning,
            "ERROR" | "SEVERE" => Self::Error,
            "CRITICAL" => Self::Critical,
            _ => Self::Info,
        }
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(with = "timestamp_format")]
    timestamp: NaiveDateTime,
    level: LogLevel,
    message: String,
}

impl LogEntry {
    /// Creates an entry from already-parsed parts.
    #[must_use]
    pub fn new(timestamp: NaiveDateTime, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
        }
    }

    /// Parses one line.
    ///
    /// Trailing line terminators are ignored; all other whitespace in the
    /// message is kept as written.
    ///
    /// # Errors
    ///
    /// - `ParseError::TooFewFields` if the line has fewer than four
    ///   space-separated segments.
    /// - `ParseError::InvalidTimestamp` if the first two segments do not form
    ///   a `YYYY-MM-DD HH:MM:SS,mmm` timestamp.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(4, ' ');
        let (Some(date), Some(time), Some(level), Some(message)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::TooFewFields {
                found: line.splitn(4, ' ').count(),
                line: line.to_string(),
            });
        };

        let raw = format!("{date} {time}");
        let timestamp = NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(|e| {
            ParseError::InvalidTimestamp {
                raw: raw.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            timestamp,
            level: LogLevel::parse(level),
            message: message.to_string(),
        })
    }

    /// When the line was written (local wall-clock, millisecond precision).
    #[must_use]
    pub const fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Severity.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    /// Everything after the level token.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl FromStr for LogEntry {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            format_timestamp(&self.timestamp),
            self.level,
            self.message
        )
    }
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::time::{format_timestamp, TIMESTAMP_FORMAT};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
