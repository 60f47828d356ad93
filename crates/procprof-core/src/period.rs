use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unit of a profiler's sampling period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl PeriodUnit {
    /// Converts `period` of this unit into a [`Duration`], saturating on overflow.
    pub fn to_duration(self, period: u64) -> Duration {
        match self {
            Self::Nanoseconds => Duration::from_nanos(period),
            Self::Microseconds => Duration::from_micros(period),
            Self::Milliseconds => Duration::from_millis(period),
            Self::Seconds => Duration::from_secs(period),
            Self::Minutes => Duration::from_secs(period.saturating_mul(60)),
            Self::Hours => Duration::from_secs(period.saturating_mul(60 * 60)),
            Self::Days => Duration::from_secs(period.saturating_mul(24 * 60 * 60)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
            Self::Days => "d",
        }
    }
}

impl fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodUnit {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ns" | "nanos" | "nanoseconds" => Ok(Self::Nanoseconds),
            "us" | "micros" | "microseconds" => Ok(Self::Microseconds),
            "ms" | "millis" | "milliseconds" => Ok(Self::Milliseconds),
            "s" | "sec" | "secs" | "seconds" => Ok(Self::Seconds),
            "m" | "min" | "mins" | "minutes" => Ok(Self::Minutes),
            "h" | "hour" | "hours" => Ok(Self::Hours),
            "d" | "day" | "days" => Ok(Self::Days),
            other => Err(format!("unknown period unit `{other}`")),
        }
    }
}
