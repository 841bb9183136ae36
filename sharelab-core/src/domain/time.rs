//! Timestamps and the simulation grid.
//!
//! Every date in the engine is a `NaiveDateTime` at second precision. The grid
//! is `anchor + k·step` for a fixed `Granularity`, where the anchor is the
//! strategy start. With a one-day step anchored at midnight, `2021-01-11 12:00`
//! rounds up to `2021-01-12 00:00`.

use crate::error::ConfigurationError;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;
/// Largest step `chrono::Duration` can hold.
const MAX_SECONDS: i64 = i64::MAX / 1_000;

/// Fixed time step of the simulation (e.g. one day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Granularity {
    seconds: i64,
}

impl Granularity {
    pub fn from_seconds(seconds: i64) -> Result<Self, ConfigurationError> {
        if seconds <= 0 || seconds > MAX_SECONDS {
            return Err(ConfigurationError::InvalidGranularity(format!("{seconds}s")));
        }
        Ok(Self { seconds })
    }

    pub fn days(n: i64) -> Self {
        Self {
            seconds: n.clamp(1, MAX_SECONDS / SECONDS_PER_DAY) * SECONDS_PER_DAY,
        }
    }

    pub fn hours(n: i64) -> Self {
        Self {
            seconds: n.clamp(1, MAX_SECONDS / SECONDS_PER_HOUR) * SECONDS_PER_HOUR,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::try_seconds(self.seconds).unwrap_or_else(|| Duration::seconds(MAX_SECONDS))
    }

    pub fn num_seconds(&self) -> i64 {
        self.seconds
    }

    /// Round `dt` up to the next grid point `anchor + k·step` (unchanged if
    /// already on one). `None` when the result is not representable.
    pub fn ceil(&self, anchor: NaiveDateTime, dt: NaiveDateTime) -> Option<NaiveDateTime> {
        let offset = dt.signed_duration_since(anchor);
        let mut seconds = offset.num_seconds();
        // floor sub-second remainders of negative offsets
        if offset.subsec_nanos() < 0 {
            seconds -= 1;
        }
        let on_grid = seconds.rem_euclid(self.seconds) == 0 && offset.subsec_nanos() == 0;
        let mut steps = seconds.div_euclid(self.seconds);
        if !on_grid {
            steps += 1;
        }
        let shift = Duration::try_seconds(steps.checked_mul(self.seconds)?)?;
        anchor.checked_add_signed(shift)
    }

    /// Whether `dt` lies on the grid anchored at `anchor`.
    pub fn is_on_grid(&self, anchor: NaiveDateTime, dt: NaiveDateTime) -> bool {
        self.ceil(anchor, dt) == Some(dt)
    }

    /// The step before `dt`.
    pub fn prev(&self, dt: NaiveDateTime) -> NaiveDateTime {
        dt - self.as_duration()
    }

    /// The step after `dt`.
    pub fn next(&self, dt: NaiveDateTime) -> NaiveDateTime {
        dt + self.as_duration()
    }

    /// Grid points from `start` stepping by the granularity while `<= end`.
    pub fn steps(&self, start: NaiveDateTime, end: NaiveDateTime) -> GridSteps {
        GridSteps {
            next: Some(start),
            end,
            step: self.as_duration(),
        }
    }

    /// Points of the grid anchored at `anchor` that fall within `[from, to]`.
    pub fn anchored_steps(&self, anchor: NaiveDateTime, from: NaiveDateTime, to: NaiveDateTime) -> GridSteps {
        GridSteps {
            next: self.ceil(anchor, from),
            end: to,
            step: self.as_duration(),
        }
    }
}

impl Default for Granularity {
    fn default() -> Self {
        Self::days(1)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.seconds;
        if s % SECONDS_PER_DAY == 0 {
            write!(f, "{}D", s / SECONDS_PER_DAY)
        } else if s % SECONDS_PER_HOUR == 0 {
            write!(f, "{}H", s / SECONDS_PER_HOUR)
        } else if s % SECONDS_PER_MINUTE == 0 {
            write!(f, "{}min", s / SECONDS_PER_MINUTE)
        } else {
            write!(f, "{s}S")
        }
    }
}

impl FromStr for Granularity {
    type Err = ConfigurationError;

    /// Parses `<n><unit>`, e.g. `1D`, `4h`, `30min`, `15T`, `2W`. `n` defaults to 1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigurationError::InvalidGranularity(s.to_string());
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);
        let count: i64 = if digits.is_empty() {
            1
        } else {
            digits.parse().map_err(|_| invalid())?
        };
        // Upper-case `M` is a calendar month elsewhere; months aren't a fixed step.
        if unit == "M" {
            return Err(invalid());
        }
        let unit_seconds = match unit.trim().to_ascii_lowercase().as_str() {
            "d" | "day" | "days" => SECONDS_PER_DAY,
            "h" | "hour" | "hours" => SECONDS_PER_HOUR,
            "t" | "m" | "min" | "minute" | "minutes" => SECONDS_PER_MINUTE,
            "s" | "sec" | "second" | "seconds" => 1,
            "w" | "week" | "weeks" => 7 * SECONDS_PER_DAY,
            _ => return Err(invalid()),
        };
        let seconds = count.checked_mul(unit_seconds).ok_or_else(invalid)?;
        if seconds <= 0 || seconds > MAX_SECONDS {
            return Err(invalid());
        }
        Ok(Self { seconds })
    }
}

impl TryFrom<String> for Granularity {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Granularity> for String {
    fn from(value: Granularity) -> Self {
        value.to_string()
    }
}

/// Iterator over grid points, see [`Granularity::steps`].
#[derive(Debug, Clone)]
pub struct GridSteps {
    next: Option<NaiveDateTime>,
    end: NaiveDateTime,
    step: Duration,
}

impl Iterator for GridSteps {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|n| *n <= self.end)?;
        self.next = current.checked_add_signed(self.step);
        Some(current)
    }
}

/// Parse a timestamp in one of the accepted layouts.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]` and the ISO `T` separator.
/// Anything after the seconds (fraction, `Z`, offset) is dropped.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, ConfigurationError> {
    let invalid = || ConfigurationError::InvalidTimestamp(s.to_string());
    let cleaned = s.trim().replace('T', " ").replace('Z', "");

    if let Some(head) = cleaned.get(..19) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S") {
            return Ok(dt);
        }
    }
    if let Some(head) = cleaned.get(..16) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M") {
            return Ok(dt);
        }
    }
    let date_part = cleaned.get(..10).ok_or_else(invalid)?;
    if cleaned.len() > 10 && !cleaned[10..].trim().is_empty() {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(invalid)
}

/// Serde helper: deserialize a timestamp from any layout `parse_timestamp` accepts.
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// Serde helper for optional timestamps.
pub fn deserialize_opt_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        Some(s) if !s.trim().is_empty() => parse_timestamp(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn parses_date_only() {
        assert_eq!(ts("2021-01-01"), ts("2021-01-01 00:00:00"));
    }

    #[test]
    fn parses_iso_with_zulu() {
        assert_eq!(ts("2021-01-01T12:30:00Z"), ts("2021-01-01 12:30:00"));
        assert_eq!(ts("2021-01-01T12:30:00.123Z"), ts("2021-01-01 12:30:00"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("2021-01-01 noon").is_err());
    }

    #[test]
    fn granularity_parsing() {
        assert_eq!("1D".parse::<Granularity>().unwrap(), Granularity::days(1));
        assert_eq!("D".parse::<Granularity>().unwrap(), Granularity::days(1));
        assert_eq!("4h".parse::<Granularity>().unwrap(), Granularity::hours(4));
        assert_eq!("30min".parse::<Granularity>().unwrap().num_seconds(), 1_800);
        assert_eq!("1W".parse::<Granularity>().unwrap(), Granularity::days(7));
        assert!("1M".parse::<Granularity>().is_err());
        assert!("0D".parse::<Granularity>().is_err());
        assert!("fortnight".parse::<Granularity>().is_err());
    }

    #[test]
    fn granularity_display_roundtrips() {
        for g in ["1D", "4H", "30min", "45S"] {
            let parsed: Granularity = g.parse().unwrap();
            assert_eq!(parsed.to_string(), g);
        }
    }

    #[test]
    fn ceil_rounds_up_to_next_boundary() {
        let day = Granularity::days(1);
        // day 10 + 36h lands mid-day 11 and rounds to day 12
        let delayed = ts("2021-01-10") + Duration::hours(36);
        assert_eq!(day.ceil(ts("2021-01-01"), delayed), Some(ts("2021-01-12")));
    }

    #[test]
    fn ceil_keeps_boundary() {
        let day = Granularity::days(1);
        assert_eq!(day.ceil(ts("2021-01-01"), ts("2021-01-10")), Some(ts("2021-01-10")));
    }

    #[test]
    fn ceil_follows_the_anchor() {
        // 2021-01-04 is a Monday; the weekly grid stays on Mondays
        let week = Granularity::days(7);
        let monday = ts("2021-01-04");
        assert_eq!(week.ceil(monday, ts("2021-01-11")), Some(ts("2021-01-11")));
        assert_eq!(week.ceil(monday, ts("2021-01-12")), Some(ts("2021-01-18")));

        let day = Granularity::days(1);
        let noon = ts("2021-01-01 12:00");
        assert_eq!(day.ceil(noon, ts("2021-01-02 12:00")), Some(ts("2021-01-02 12:00")));
        assert_eq!(day.ceil(noon, ts("2021-01-02")), Some(ts("2021-01-02 12:00")));
        assert!(day.is_on_grid(noon, ts("2021-01-05 12:00")));
        assert!(!day.is_on_grid(noon, ts("2021-01-05")));
    }

    #[test]
    fn ceil_before_anchor_rounds_towards_it() {
        let day = Granularity::days(1);
        let anchor = ts("2021-01-10");
        assert_eq!(day.ceil(anchor, ts("2021-01-08 06:00")), Some(ts("2021-01-09")));
    }

    #[test]
    fn ceil_out_of_range_is_none() {
        let day = Granularity::days(1);
        assert_eq!(day.ceil(ts("2021-01-01"), NaiveDateTime::MAX), None);
    }

    #[test]
    fn anchored_steps_start_on_the_grid() {
        let week = Granularity::days(7);
        let grid: Vec<_> = week
            .anchored_steps(ts("2021-01-04"), ts("2021-01-06"), ts("2021-01-25"))
            .collect();
        assert_eq!(grid, vec![ts("2021-01-11"), ts("2021-01-18"), ts("2021-01-25")]);
    }

    #[test]
    fn huge_granularity_is_rejected_or_stops_safely() {
        assert!("100000000000000W".parse::<Granularity>().is_err());
        let huge: Granularity = "100000000W".parse().unwrap();
        let grid: Vec<_> = huge.steps(ts("2021-01-01"), NaiveDateTime::MAX).collect();
        assert_eq!(grid, vec![ts("2021-01-01")]);
    }

    #[test]
    fn steps_are_inclusive() {
        let day = Granularity::days(1);
        let grid: Vec<_> = day.steps(ts("2021-01-01"), ts("2021-01-03")).collect();
        assert_eq!(grid, vec![ts("2021-01-01"), ts("2021-01-02"), ts("2021-01-03")]);
    }

    #[test]
    fn steps_empty_when_inverted() {
        let day = Granularity::days(1);
        assert_eq!(day.steps(ts("2021-01-03"), ts("2021-01-01")).count(), 0);
    }
}
