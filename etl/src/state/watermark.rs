use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EtlError, EtlResult};

/// Canonical text form of a watermark, e.g. `2021-06-16 20:14:09.221838`.
const WATERMARK_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Formats accepted when reading a watermark back. `%.f` also accepts a missing fraction.
const ACCEPTED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// 2000-01-01 00:00:00 UTC, older than any row in the catalogue.
const INITIAL_WATERMARK_SECS: i64 = 946_684_800;

/// A UTC instant used to remember how far a sweep has progressed.
///
/// Stored in the state file as a `YYYY-MM-DD HH:MM:SS.ffffff` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(NaiveDateTime);

impl Watermark {
    /// The sentinel used before the first primary sweep, `2000-01-01 00:00:00.000000`.
    pub fn initial() -> Self {
        let initial = DateTime::from_timestamp(INITIAL_WATERMARK_SECS, 0)
            .map(|dt| dt.naive_utc())
            .unwrap_or_default();

        Self(initial)
    }

    pub fn now() -> Self {
        Self(Utc::now().naive_utc())
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }

    pub fn to_utc(&self) -> DateTime<Utc> {
        self.0.and_utc()
    }
}

impl From<NaiveDateTime> for Watermark {
    fn from(value: NaiveDateTime) -> Self {
        Self(value)
    }
}

impl From<DateTime<Utc>> for Watermark {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.naive_utc())
    }
}

impl FromStr for Watermark {
    type Err = EtlError;

    fn from_str(s: &str) -> EtlResult<Self> {
        let s = s.trim();

        let mut last_err = None;
        for format in ACCEPTED_FORMATS {
            match NaiveDateTime::parse_from_str(s, format) {
                Ok(parsed) => return Ok(Self(parsed)),
                Err(err) => last_err = Some(err),
            }
        }

        match DateTime::parse_from_rfc3339(s) {
            Ok(parsed) => Ok(Self(parsed.naive_utc())),
            Err(err) => Err(last_err.unwrap_or(err).into()),
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(WATERMARK_FORMAT))
    }
}

impl Serialize for Watermark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Watermark {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
