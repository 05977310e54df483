//! Zettel identifiers.
//!
//! A [`Zid`] is a 14 digit decimal number, usually derived from the creation
//! timestamp (`YYYYMMDDhhmmss`). The value `0` is reserved as "invalid".

mod set;
mod slice;

pub use set::ZidSet;
pub use slice::ZidSlice;

use chrono::{Local, NaiveDateTime, Timelike};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const ZID_LENGTH: usize = 14;
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const MAX_NEW_ATTEMPTS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZidError {
    #[error("invalid zettel id syntax: {0:?}")]
    Syntax(String),
    #[error("zettel id out of range: {0:?}")]
    Range(String),
    #[error("no free zettel id after {0} attempts")]
    Exhausted(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Zid(u64);

impl Zid {
    pub const INVALID: Zid = Zid(0);
    pub const MAX: Zid = Zid(99_999_999_999_999);

    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 > 0 && self.0 <= Self::MAX.0
    }

    /// Parses exactly 14 ASCII digits.
    pub fn parse(value: &str) -> Result<Self, ZidError> {
        if value.len() != ZID_LENGTH || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ZidError::Syntax(value.to_string()));
        }
        let number = parse_digits(value).ok_or_else(|| ZidError::Syntax(value.to_string()))?;
        let zid = Self(number);
        if !zid.is_valid() {
            return Err(ZidError::Range(value.to_string()));
        }
        Ok(zid)
    }

    /// Identifier derived from the current local time. Without seconds the
    /// seconds field is always `00`.
    pub fn new(with_seconds: bool) -> Self {
        let now = Local::now().naive_local();
        let now = if with_seconds {
            now
        } else {
            now.with_second(0).unwrap_or(now)
        };
        Self::from_timestamp(now)
    }

    /// Generates a time based identifier and steps forward (one minute, or one
    /// second when `with_seconds`) until `is_free` accepts a candidate.
    pub fn new_with<F>(with_seconds: bool, mut is_free: F) -> Result<Self, ZidError>
    where
        F: FnMut(Zid) -> bool,
    {
        let mut candidate = Self::new(with_seconds);
        for _ in 0..MAX_NEW_ATTEMPTS {
            if candidate.is_valid() && is_free(candidate) {
                return Ok(candidate);
            }
            candidate = candidate.next_timestamp(with_seconds);
        }
        Err(ZidError::Exhausted(MAX_NEW_ATTEMPTS))
    }

    fn from_timestamp(timestamp: NaiveDateTime) -> Self {
        let rendered = timestamp.format(TIMESTAMP_FORMAT).to_string();
        Self(parse_digits(&rendered).unwrap_or_default())
    }

    fn next_timestamp(self, with_seconds: bool) -> Self {
        let step = if with_seconds {
            chrono::Duration::seconds(1)
        } else {
            chrono::Duration::minutes(1)
        };
        match NaiveDateTime::parse_from_str(&self.to_string(), TIMESTAMP_FORMAT) {
            Ok(timestamp) => Self::from_timestamp(timestamp + step),
            Err(_) => Self(self.0.saturating_add(1)),
        }
    }
}

impl fmt::Display for Zid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:014}", self.0)
    }
}

impl FromStr for Zid {
    type Err = ZidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parses up to 14 decimal digits without the exact-length requirement of
/// [`Zid::parse`]. Used by the index when a search term may be a partial id.
pub fn parse_uint(value: &str) -> Option<u64> {
    if value.is_empty() || value.len() > ZID_LENGTH {
        return None;
    }
    parse_digits(value)
}

fn parse_digits(value: &str) -> Option<u64> {
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse::<u64>().ok()
}

/// Extracts the zid from the first 14 characters of a file name.
pub fn seek_zid(name: &str) -> Zid {
    name.get(..ZID_LENGTH)
        .and_then(|prefix| Zid::parse(prefix).ok())
        .unwrap_or(Zid::INVALID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parse_and_format_roundtrip() {
        let zid = Zid::parse("20200310195100").expect("valid zid");
        assert_eq!(zid, Zid::from_u64(20200310195100));
        assert_eq!(zid.to_string(), "20200310195100");
        assert_eq!(Zid::from_u64(1).to_string(), "00000000000001");
        assert_eq!(Zid::parse("00000000000001"), Ok(Zid::from_u64(1)));
    }

    #[test]
    fn parse_rejects_wrong_length_and_zero() {
        assert!(matches!(Zid::parse("2020031019510"), Err(ZidError::Syntax(_))));
        assert!(matches!(Zid::parse("202003101951000"), Err(ZidError::Syntax(_))));
        assert!(matches!(Zid::parse("2020031019510a"), Err(ZidError::Syntax(_))));
        assert!(matches!(Zid::parse("+0200310195100"), Err(ZidError::Syntax(_))));
        assert!(matches!(Zid::parse("00000000000000"), Err(ZidError::Range(_))));
    }

    #[test]
    fn new_without_seconds_ends_in_zero_seconds() {
        let zid = Zid::new(false);
        assert!(zid.is_valid());
        assert_eq!(zid.as_u64() % 100, 0);
    }

    #[test]
    fn new_with_skips_taken_ids() {
        let mut taken = HashSet::new();
        let first = Zid::new_with(true, |zid| !taken.contains(&zid)).expect("first id");
        taken.insert(first);
        let second = Zid::new_with(true, |zid| !taken.contains(&zid)).expect("second id");
        assert_ne!(first, second);
        assert!(second > first);
    }

    #[test]
    fn new_with_is_bounded() {
        let err = Zid::new_with(false, |_| false).expect_err("never free");
        assert_eq!(err, ZidError::Exhausted(10_000));
    }

    #[test]
    fn minute_steps_roll_over() {
        let zid = Zid::parse("20201231235900").expect("valid");
        assert_eq!(zid.next_timestamp(false).to_string(), "20210101000000");
        let zid = Zid::parse("20200310195159").expect("valid");
        assert_eq!(zid.next_timestamp(true).to_string(), "20200310195200");
    }

    #[test]
    fn seek_zid_uses_prefix() {
        assert_eq!(seek_zid("20200310195100.zettel").to_string(), "20200310195100");
        assert_eq!(seek_zid("20200310195100 title.md").to_string(), "20200310195100");
        assert_eq!(seek_zid("2020031019510.md"), Zid::INVALID);
        assert_eq!(seek_zid("abc"), Zid::INVALID);
    }

    #[test]
    fn parse_uint_accepts_partial_ids() {
        assert_eq!(parse_uint("123"), Some(123));
        assert_eq!(parse_uint(""), None);
        assert_eq!(parse_uint("12a"), None);
        assert_eq!(parse_uint("123456789012345"), None);
    }
}
