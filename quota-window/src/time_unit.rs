use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// The unit a request quota is expressed in, e.g. "100 per minute".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// The length of one unit.
    pub fn as_duration(self) -> Duration {
        match self {
            Self::Nanoseconds => Duration::from_nanos(1),
            Self::Microseconds => Duration::from_micros(1),
            Self::Milliseconds => Duration::from_millis(1),
            Self::Seconds => Duration::from_secs(1),
            Self::Minutes => Duration::from_secs(60),
            Self::Hours => Duration::from_secs(60 * 60),
            Self::Days => Duration::from_secs(24 * 60 * 60),
        }
    }

    /// The length of `count` units, saturating at `Duration::MAX`.
    pub fn times(self, count: u32) -> Duration {
        self.as_duration().saturating_mul(count)
    }

    fn name(self) -> &'static str {
        match self {
            Self::Nanoseconds => "nanoseconds",
            Self::Microseconds => "microseconds",
            Self::Milliseconds => "milliseconds",
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown time unit name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown time unit: {0}")]
pub struct ParseTimeUnitError(String);

impl FromStr for TimeUnit {
    type Err = ParseTimeUnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nanoseconds" | "ns" => Ok(Self::Nanoseconds),
            "microseconds" | "us" => Ok(Self::Microseconds),
            "milliseconds" | "ms" => Ok(Self::Milliseconds),
            "seconds" | "s" => Ok(Self::Seconds),
            "minutes" | "m" => Ok(Self::Minutes),
            "hours" | "h" => Ok(Self::Hours),
            "days" | "d" => Ok(Self::Days),
            _ => Err(ParseTimeUnitError(s.to_string())),
        }
    }
}
