//! Persisted schedule entries.

use std::fmt;

use chrono::{DateTime, Datelike, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Which workflow a schedule entry triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    /// Pivot refresh only
    Pivot,
    /// Export and download the flat files
    Dashboard,
    /// Dashboard followed by the pivot refresh
    Both,
}

impl WorkflowKind {
    pub fn runs_dashboard(self) -> bool {
        matches!(self, Self::Dashboard | Self::Both)
    }

    pub fn runs_pivot(self) -> bool {
        matches!(self, Self::Pivot | Self::Both)
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pivot => "pivot",
            Self::Dashboard => "dashboard",
            Self::Both => "both",
        };
        f.write_str(name)
    }
}

/// A user-defined trigger for a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Local wall-clock time; for repeating entries only weekday, hour
    /// and minute matter
    #[serde(with = "local_time")]
    pub date: NaiveDateTime,

    /// Weekly repeat instead of one-shot
    #[serde(default)]
    pub repeat: bool,

    #[serde(rename = "type")]
    pub kind: WorkflowKind,
}

impl ScheduleEntry {
    /// Whether the entry is due at `now`.
    ///
    /// Repeating entries match on weekday, hour and minute; one-shot
    /// entries match within 60 seconds either side.
    pub fn matches(&self, now: NaiveDateTime) -> bool {
        if self.repeat {
            now.weekday() == self.date.weekday()
                && now.hour() == self.date.hour()
                && now.minute() == self.date.minute()
        } else {
            (now - self.date).num_seconds().abs() < 60
        }
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.repeat {
            write!(
                f,
                "{} every {} at {}",
                self.kind,
                self.date.weekday(),
                self.date.format("%H:%M")
            )
        } else {
            write!(f, "{} once at {}", self.kind, self.date.format("%Y-%m-%d %H:%M"))
        }
    }
}

const FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a local date-time as typed by a user or stored by older
/// settings files. Offsets are converted to local time.
pub fn parse_local(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
        return Ok(with_offset.with_timezone(&Local).naive_local());
    }
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| AppError::Schedule(format!("Unrecognised date-time '{value}'")))
}

mod local_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.format("%Y-%m-%dT%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_local(&raw).map_err(serde::de::Error::custom)
    }
}
