use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Nanoseconds since the Unix epoch.
///
/// Watermarks and file timestamps are compared in this unit on both sides,
/// so a file stamped exactly at the watermark is never picked up twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticks(i64);

impl Ticks {
    /// The minimum representable instant; fresh watermarks start here.
    pub const MIN: Ticks = Ticks(i64::MIN);

    pub const fn new(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self(i64::try_from(after.as_nanos()).unwrap_or(i64::MAX)),
            Err(before) => Self(
                i64::try_from(before.duration().as_nanos())
                    .map(|n| -n)
                    .unwrap_or(i64::MIN),
            ),
        }
    }

    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        Self(time.timestamp_nanos_opt().unwrap_or(if time.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        }))
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }

    pub fn is_min(&self) -> bool {
        *self == Self::MIN
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_min() {
            write!(f, "-infinity")
        } else {
            write!(f, "{}", self.to_datetime().to_rfc3339())
        }
    }
}

/// Which file timestamp a watcher compares against its watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatcherVariant {
    /// Files are new when their creation time passes the watermark.
    CreationTime,
    /// Files are new when their last write time passes the watermark.
    WriteTime,
}

impl WatcherVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherVariant::CreationTime => "creation-time",
            WatcherVariant::WriteTime => "write-time",
        }
    }
}

impl fmt::Display for WatcherVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Opaque handle returned when a parser is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParserHandle(Uuid);

impl ParserHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParserHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file selected by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Full path of the source file.
    pub path: PathBuf,
    /// Base name the file pattern was matched against.
    pub name: String,
    /// The timestamp that qualified the file (creation or write time).
    pub timestamp: Ticks,
}
