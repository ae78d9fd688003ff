//! Calendar trigger values: time-of-day and day-of-week.
//!
//! Both types serialize as the strings a human writes in the config file
//! (`"02:00"`, `"monday,thursday"`, `"weekends"`) and validate on parse.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Time of day
// ---------------------------------------------------------------------------

/// Time of day after which a calendar-triggered scan may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScanTime(NaiveTime);

impl ScanTime {
    pub fn new(time: NaiveTime) -> Self {
        Self(time)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    /// True once the wall clock reached this time of day (inclusive).
    pub fn is_reached(&self, now: NaiveTime) -> bool {
        now.with_nanosecond(0).unwrap_or(now) >= self.0
    }
}

impl FromStr for ScanTime {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .map(Self)
            .map_err(|_| {
                ConfigError::invalid("scan_time", format!("'{s}' is not HH:MM or HH:MM:SS"))
            })
    }
}

impl TryFrom<String> for ScanTime {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScanTime> for String {
    fn from(value: ScanTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ScanTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M:%S"))
    }
}

// ---------------------------------------------------------------------------
// Days of week
// ---------------------------------------------------------------------------

/// Non-empty set of weekdays on which a calendar-triggered scan may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScanDays(u8);

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl ScanDays {
    pub fn single(day: Weekday) -> Self {
        Self(bit(day))
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & bit(day) != 0
    }

    pub fn days(&self) -> impl Iterator<Item = Weekday> + '_ {
        ALL_DAYS.into_iter().filter(|d| self.contains(*d))
    }
}

fn bit(day: Weekday) -> u8 {
    1 << day.num_days_from_monday()
}

impl FromStr for ScanDays {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = 0u8;
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "weekdays" => {
                    mask |= ALL_DAYS[..5].iter().fold(0, |acc, d| acc | bit(*d));
                }
                "weekends" => mask |= bit(Weekday::Sat) | bit(Weekday::Sun),
                other => {
                    let day = other.parse::<Weekday>().map_err(|_| {
                        ConfigError::invalid("scan_day", format!("unknown day '{token}'"))
                    })?;
                    mask |= bit(day);
                }
            }
        }
        if mask == 0 {
            return Err(ConfigError::invalid("scan_day", "no day given"));
        }
        Ok(Self(mask))
    }
}

impl TryFrom<String> for ScanDays {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScanDays> for String {
    fn from(value: ScanDays) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ScanDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .days()
            .map(|d| format!("{d:?}").to_ascii_lowercase())
            .collect();
        f.write_str(&names.join(","))
    }
}
