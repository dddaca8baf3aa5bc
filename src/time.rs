//! Time helpers for raw-data filenames and survey schedules.
//!
//! Raw stream files are named after the UTC start of the period they cover, e.g.
//! `2020-03-01 14_00_00.csv`. [HourBucket] is the parsed form of that name.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::error::RegistryError;

/// Format used in raw filenames.
pub const FILENAME_TIME_FORMAT: &str = "%Y-%m-%d %H_%M_%S";

/// Format used in human-readable summaries.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const SECONDS_PER_HOUR: i64 = 60 * 60;
pub const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

/// Day order used by survey schedules.
pub const DAY_ORDER: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

static STEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}_\d{2}_\d{2})(\.[A-Za-z0-9]+)*$")
        .expect("static regex is valid")
});

/// UTC timestamp identifying one raw file of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourBucket(DateTime<Utc>);

impl HourBucket {
    /// Parse a raw filename such as `2020-03-01 14_00_00.csv`. Returns `None` for names that do
    /// not follow the convention.
    pub fn from_filename(name: &str) -> Option<HourBucket> {
        let captures = STEM.captures(name)?;
        let stem = captures.get(1)?.as_str();
        HourBucket::from_str(stem).ok()
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Truncate to the start of the containing hour.
    pub fn hour_start(&self) -> HourBucket {
        let truncated = self
            .0
            .with_minute(0)
            .and_then(|dt| dt.with_second(0))
            .and_then(|dt| dt.with_nanosecond(0))
            .unwrap_or(self.0);
        HourBucket(truncated)
    }

    pub fn seconds_until(&self, later: &HourBucket) -> i64 {
        (later.0 - self.0).num_seconds()
    }

    /// Human readable form for summaries, e.g. `2020-03-01 14:00:00 UTC`.
    pub fn readable(&self) -> String {
        format!("{} UTC", self.0.format(DATE_TIME_FORMAT))
    }
}

impl From<DateTime<Utc>> for HourBucket {
    fn from(dt: DateTime<Utc>) -> Self {
        HourBucket(dt)
    }
}

impl FromStr for HourBucket {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let naive = NaiveDateTime::parse_from_str(s, FILENAME_TIME_FORMAT)?;
        Ok(HourBucket(naive.and_utc()))
    }
}

impl Display for HourBucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(FILENAME_TIME_FORMAT))
    }
}

impl Serialize for HourBucket {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HourBucket {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        HourBucket::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Convert a second-offset from local midnight into clock time, `HH:MM`.
pub fn clock_time(seconds: i64) -> String {
    let seconds = seconds.rem_euclid(SECONDS_PER_DAY);
    format!("{:02}:{:02}", seconds / SECONDS_PER_HOUR, (seconds % SECONDS_PER_HOUR) / 60)
}

/// Days between two observations, rounded to one decimal place.
pub fn days_between(first: &HourBucket, last: &HourBucket) -> f64 {
    let days = first.seconds_until(last) as f64 / SECONDS_PER_DAY as f64;
    (days * 10.0).round() / 10.0
}

/// Current local time, used to stamp exported summaries.
pub fn local_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_parse_filename_with_extensions() {
        let bucket = HourBucket::from_filename("2020-03-01 14_00_00.csv").unwrap();
        assert_eq!(bucket.to_string(), "2020-03-01 14_00_00");

        let audio = HourBucket::from_filename("2020-03-01 14_23_05.mp4").unwrap();
        assert_eq!(audio.hour_start(), bucket);

        assert!(HourBucket::from_filename("2020-03-01T14:00:00.csv").is_none());
        assert!(HourBucket::from_filename("notes.txt").is_none());
        assert!(HourBucket::from_filename("2020-13-01 14_00_00.csv").is_none());
    }

    #[test]
    fn test_serde_as_string_key() {
        let bucket: HourBucket = "2021-01-02 03_00_00".parse().unwrap();
        let json = serde_json::to_string(&bucket).unwrap();
        assert_eq!(json, "\"2021-01-02 03_00_00\"");
        let back: HourBucket = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bucket);
    }

    #[test]
    fn test_clock_time_and_days() {
        assert_eq!(clock_time(0), "00:00");
        assert_eq!(clock_time(9 * 3600 + 30 * 60), "09:30");
        assert_eq!(clock_time(SECONDS_PER_DAY + 60), "00:01");

        let first: HourBucket = "2021-01-01 00_00_00".parse().unwrap();
        let last: HourBucket = "2021-01-02 12_00_00".parse().unwrap();
        assert_eq!(days_between(&first, &last), 1.5);
    }
}
