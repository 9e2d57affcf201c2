//! Wire timestamp parsing.
//!
//! Every instant written by this crate carries an explicit `Z`. Older rows may
//! have been stored without an offset; [`NaiveTimestampPolicy`] decides whether
//! those are read as UTC or rejected as inconsistent data.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NaiveTimestampPolicy {
    /// Treat a value without an offset as UTC.
    #[default]
    AssumeUtc,
    /// Treat a value without an offset as a data inconsistency.
    Reject,
}

pub fn parse_wire_timestamp(
    value: &str,
    policy: NaiveTimestampPolicy,
) -> Result<DateTime<Utc>, RecordError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RecordError::EmptyTimestamp);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return match policy {
                NaiveTimestampPolicy::AssumeUtc => Ok(Utc.from_utc_datetime(&naive)),
                NaiveTimestampPolicy::Reject => Err(RecordError::MissingOffset(value.to_owned())),
            };
        }
    }

    Err(RecordError::Unparsable(value.to_owned()))
}

/// Parses a value at the ingestion boundary, where an offset is mandatory.
pub fn require_explicit_offset(value: &str) -> Result<DateTime<Utc>, RecordError> {
    parse_wire_timestamp(value, NaiveTimestampPolicy::Reject)
}

pub fn format_wire_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
