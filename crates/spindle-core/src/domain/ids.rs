//! Task identifiers.
//!
//! An id is `{timestamp}-{type}` where the timestamp is the ISO 8601 basic
//! form with microseconds, in UTC: `20240101T123456.123456-rip`.
//!
//! - Lexicographic order equals creation order (within a type).
//! - The type suffix lets the claim loop filter by owner without opening files.
//! - The id doubles as the record file stem (`{id}.json`).

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::TaskType;
use crate::error::SpindleError;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6f";

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{8}T\d{6}\.\d{6})-([a-z_]+)$").expect("static id pattern")
});

static SHORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{8}T(\d{4})\d{2}\.(\d{6})-([a-z_]+)$").expect("static short-id pattern")
});

/// Identifier of a Task Record.
///
/// Serialized as its plain string form; parsing validates both the timestamp
/// shape and the type suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId {
    raw: String,
    task_type: TaskType,
}

impl TaskId {
    /// Build an id from its parts. Sub-microsecond precision is dropped.
    pub fn from_parts(at: DateTime<Utc>, task_type: TaskType) -> Self {
        Self {
            raw: format!("{}-{}", at.format(TIMESTAMP_FORMAT), task_type),
            task_type,
        }
    }

    pub fn parse(s: &str) -> Result<Self, SpindleError> {
        let caps = ID_PATTERN
            .captures(s)
            .ok_or_else(|| SpindleError::InvalidTaskId(s.to_string()))?;
        let task_type: TaskType = caps[2].parse()?;
        NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT)
            .map_err(|_| SpindleError::InvalidTaskId(s.to_string()))?;
        Ok(Self {
            raw: s.to_string(),
            task_type,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Creation time embedded in the id.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let (stamp, _) = self.raw.split_once('-')?;
        NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Display-only abbreviation `HHMM.ffffff-type`.
    pub fn short(&self) -> String {
        match SHORT_PATTERN.captures(&self.raw) {
            Some(caps) => format!("{}.{}-{}", &caps[1], &caps[2], &caps[3]),
            None => self.raw.clone(),
        }
    }

    /// File name of this record inside a queue directory.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.raw)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for TaskId {
    type Err = SpindleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = SpindleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(h: u32, m: u32, s: u32, micros: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
            + chrono::Duration::microseconds(micros as i64)
    }

    #[test]
    fn formats_timestamp_and_type() {
        let id = TaskId::from_parts(at(12, 34, 56, 123_456), TaskType::Rip);
        assert_eq!(id.as_str(), "20240101T123456.123456-rip");
        assert_eq!(id.task_type(), TaskType::Rip);
        assert_eq!(id.file_name(), "20240101T123456.123456-rip.json");
    }

    #[test]
    fn short_form_is_hour_minute_and_micros() {
        let id = TaskId::from_parts(at(12, 34, 56, 7), TaskType::Transcode);
        assert_eq!(id.short(), "1234.000007-transcode");
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let a = TaskId::from_parts(at(9, 0, 0, 1), TaskType::Rip);
        let b = TaskId::from_parts(at(9, 0, 0, 2), TaskType::Rip);
        let c = TaskId::from_parts(at(10, 0, 0, 0), TaskType::Rip);
        assert!(a < b && b < c);
    }

    #[test]
    fn parse_roundtrips_and_recovers_timestamp() {
        let original = TaskId::from_parts(at(1, 2, 3, 4), TaskType::Insert);
        let parsed = TaskId::parse(original.as_str()).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.task_type(), TaskType::Insert);
        assert_eq!(parsed.timestamp(), Some(at(1, 2, 3, 4)));
    }

    #[rstest]
    #[case::empty("")]
    #[case::no_type("20240101T120000.000000")]
    #[case::unknown_type("20240101T120000.000000-encode")]
    #[case::bad_month("20241301T120000.000000-rip")]
    #[case::short_micros("20240101T120000.123-rip")]
    #[case::path_traversal("../20240101T120000.000000-rip")]
    fn rejects_malformed_ids(#[case] raw: &str) {
        assert!(TaskId::parse(raw).is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = TaskId::from_parts(at(12, 0, 0, 0), TaskType::Scan);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"20240101T120000.000000-scan\"");
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_type(), TaskType::Scan);
        assert!(serde_json::from_str::<TaskId>("\"nope\"").is_err());
    }
}
