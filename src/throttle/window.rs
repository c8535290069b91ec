//! Reset window resolution and expiry checks.

use chrono::{DateTime, TimeDelta, Utc};
use std::str::FromStr;
use std::time::Duration;

const MILLIS_PER_SECOND: u64 = 1_000;
const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: u64 = 24 * MILLIS_PER_HOUR;

/// Unit of the reset window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// 365 days, no calendar awareness
    Years,
    /// 30 days, no calendar awareness
    Months,
    Days,
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    /// Length of a single unit in milliseconds.
    pub fn millis(&self) -> u64 {
        match self {
            TimeUnit::Years => 365 * MILLIS_PER_DAY,
            TimeUnit::Months => 30 * MILLIS_PER_DAY,
            TimeUnit::Days => MILLIS_PER_DAY,
            TimeUnit::Hours => MILLIS_PER_HOUR,
            TimeUnit::Minutes => MILLIS_PER_MINUTE,
            TimeUnit::Seconds => MILLIS_PER_SECOND,
            TimeUnit::Milliseconds => 1,
        }
    }

    /// Resolve `amount` units into a duration, saturating on overflow.
    pub fn resolve(&self, amount: u32) -> Duration {
        Duration::from_millis(self.millis().saturating_mul(amount as u64))
    }

    /// Short configuration token for this unit.
    pub fn token(&self) -> &'static str {
        match self {
            TimeUnit::Years => "Y",
            TimeUnit::Months => "M",
            TimeUnit::Days => "D",
            TimeUnit::Hours => "H",
            TimeUnit::Minutes => "Min",
            TimeUnit::Seconds => "S",
            TimeUnit::Milliseconds => "Ms",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    /// Accepts the short tokens (`Y`, `M`, `D`, `H`, `Min`, `S`, `Ms`) and
    /// the full unit names. A bare uppercase `M` means months; lowercase
    /// `m` is rejected as ambiguous.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "M" {
            return Ok(TimeUnit::Months);
        }

        match s.to_ascii_lowercase().as_str() {
            "y" | "year" | "years" => Ok(TimeUnit::Years),
            "mo" | "month" | "months" => Ok(TimeUnit::Months),
            "d" | "day" | "days" => Ok(TimeUnit::Days),
            "h" | "hour" | "hours" => Ok(TimeUnit::Hours),
            "min" | "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "s" | "second" | "seconds" => Ok(TimeUnit::Seconds),
            "ms" | "millisecond" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            _ => Err(format!("unknown time unit '{}'", s)),
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// The sliding window after which an inactive request signature is forgotten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetWindow {
    amount: u32,
    unit: TimeUnit,
}

impl ResetWindow {
    /// Create a window of `amount` units.
    pub fn new(amount: u32, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// The window as a std duration.
    pub fn duration(&self) -> Duration {
        self.unit.resolve(self.amount)
    }

    /// The window as a chrono delta, saturating at the largest representable delta.
    pub fn time_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.duration()).unwrap_or_else(|_| TimeDelta::max_value())
    }

    /// Whether a hit at `last_hit` has aged out at `now`.
    ///
    /// An age exactly equal to the window counts as expired. A `last_hit`
    /// in the future is never expired.
    pub fn is_expired(&self, last_hit: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_hit) >= self.time_delta()
    }

    /// When a counter last hit at `last_hit` resets if left alone.
    pub fn reset_at(&self, last_hit: DateTime<Utc>) -> DateTime<Utc> {
        last_hit
            .checked_add_signed(self.time_delta())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl std::fmt::Display for ResetWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.amount, self.unit)
    }
}
