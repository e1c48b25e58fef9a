//! Transaction timestamps.
//!
//! A timestamp is the UTC time of the write formatted as
//! `YYYYMMDDHHMMSSffffff`: always 20 digits, so comparing two timestamps as
//! text, as integers, or as times gives the same answer.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{Duration, NaiveDateTime, SubsecRound, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `strftime` pattern of a timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%6f";

const TIMESTAMP_LEN: usize = 20;

/// A 20-digit transaction timestamp.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxTimestamp(String);

impl TxTimestamp {
    /// Formats a UTC time, truncated to microseconds.
    pub fn from_datetime(at: NaiveDateTime) -> Self {
        Self(at.format(TIMESTAMP_FORMAT).to_string())
    }

    /// Validates and wraps timestamp text.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let invalid = || ProtocolError::InvalidTimestamp {
            value: text.to_string(),
        };
        if text.len() != TIMESTAMP_LEN || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        NaiveDateTime::parse_from_str(&text[..14], "%Y%m%d%H%M%S").map_err(|_| invalid())?;
        Ok(Self(text.to_string()))
    }

    /// The timestamp text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The timestamp read as a decimal integer.
    pub fn as_number(&self) -> u128 {
        self.0
            .bytes()
            .fold(0u128, |acc, b| acc * 10 + u128::from(b - b'0'))
    }

    /// The UTC time this timestamp denotes.
    pub fn to_datetime(&self) -> ProtocolResult<NaiveDateTime> {
        let invalid = || ProtocolError::InvalidTimestamp {
            value: self.0.clone(),
        };
        let seconds =
            NaiveDateTime::parse_from_str(&self.0[..14], "%Y%m%d%H%M%S").map_err(|_| invalid())?;
        let micros: i64 = self.0[14..].parse().map_err(|_| invalid())?;
        Ok(seconds + Duration::microseconds(micros))
    }
}

impl fmt::Display for TxTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TxTimestamp {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TxTimestamp> for String {
    fn from(ts: TxTimestamp) -> Self {
        ts.0
    }
}

/// Source of strictly increasing timestamps.
///
/// When the wall clock has not advanced past the previous timestamp (same
/// microsecond, or the clock stepped back) the next timestamp is the
/// previous one plus one microsecond.
#[derive(Debug, Default)]
pub struct TimestampClock {
    last: Mutex<Option<NaiveDateTime>>,
}

impl TimestampClock {
    /// Creates a clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a timestamp greater than every one returned before.
    pub fn next(&self) -> TxTimestamp {
        self.next_after(Utc::now().naive_utc())
    }

    fn next_after(&self, now: NaiveDateTime) -> TxTimestamp {
        let mut now = now.trunc_subsecs(6);
        // leap second representation
        if now.nanosecond() >= 1_000_000_000 {
            now = now.with_nanosecond(999_999_000).unwrap_or(now);
        }
        let mut last = self.last.lock();
        let next = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        TxTimestamp::from_datetime(next)
    }
}
