//! Periodic rebalance schedule.
//!
//! A five-field cron expression (`minute hour day-of-month month day-of-week`)
//! evaluated by the `cron` crate, and a cursor over its occurrences that the
//! orchestrator advances as the simulation passes each trigger.

use crate::error::ConfigurationError;
use chrono::NaiveDateTime;
use cron::Schedule;
use std::fmt;
use std::str::FromStr;

/// A parsed five-field cron expression.
///
/// Day-of-week follows the five-field convention (`0` and `7` are Sunday).
/// When both day-of-month and day-of-week are restricted a day matches if
/// *either* does.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    primary: Schedule,
    /// Day-of-week half of a restricted day-of-month OR day-of-week pair.
    by_weekday: Option<Schedule>,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidCron {
            expr: expr.to_string(),
            reason,
        };
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields[..] else {
            return Err(invalid(format!("expected 5 fields, got {}", fields.len())));
        };
        for field in &fields {
            if has_zero_step(field) {
                return Err(invalid(format!("zero step in '{field}'")));
            }
        }
        let dow = weekday_field(dow).map_err(invalid)?;
        let build = |dom: &str, dow: &str| {
            Schedule::from_str(&format!("0 {minute} {hour} {dom} {month} {dow}"))
                .map_err(|e| invalid(e.to_string()))
        };

        let (primary, by_weekday) = if !dom.starts_with('*') && !dow.starts_with('*') {
            (build(dom, "*")?, Some(build("*", dow.as_str())?))
        } else {
            (build(dom, dow.as_str())?, None)
        };
        Ok(Self {
            expr: fields.join(" "),
            primary,
            by_weekday,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First occurrence strictly after `dt`, if any.
    pub fn next_after(&self, dt: NaiveDateTime) -> Option<NaiveDateTime> {
        let after = dt.and_utc();
        let next = |schedule: &Schedule| schedule.after(&after).next().map(|t| t.naive_utc());
        match (next(&self.primary), self.by_weekday.as_ref().and_then(next)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

fn has_zero_step(field: &str) -> bool {
    field
        .split(',')
        .filter_map(|part| part.split_once('/'))
        .any(|(_, step)| step.trim().parse::<u32>() == Ok(0))
}

/// Rewrite a five-field day-of-week (`0-7`, Sunday `0`/`7`) into the `cron`
/// crate's numbering (`1-7`, Sunday `1`). Names pass through unchanged.
fn weekday_field(field: &str) -> Result<String, String> {
    let shift = |raw: &str| -> Result<String, String> {
        match raw.parse::<u32>() {
            Ok(n @ 0..=7) => Ok((n % 7 + 1).to_string()),
            Ok(n) => Err(format!("{n} is out of range 0-7 for day of week")),
            Err(_) => Ok(raw.to_string()),
        }
    };

    let mut parts = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };
        let suffix = step.map(|s| format!("/{s}")).unwrap_or_default();
        // `a-7` and `a/s` run up to the second Sunday, which wraps to `1`.
        let bounds = match range.split_once('-') {
            Some((lo, hi)) => Some((lo, hi)),
            None if step.is_some() && range != "*" => Some((range, "7")),
            None => None,
        };
        match bounds {
            Some((lo, "7")) => {
                let lo_shifted = shift(lo)?;
                parts.push(format!("{lo_shifted}-7{suffix}"));
                let step: u32 = step.and_then(|s| s.parse().ok()).unwrap_or(1);
                let reaches_sunday = lo.parse::<u32>().is_ok_and(|lo| lo <= 7 && (7 - lo) % step == 0);
                if reaches_sunday {
                    parts.push("1".to_string());
                }
            }
            Some((lo, hi)) => parts.push(format!("{}-{}{suffix}", shift(lo)?, shift(hi)?)),
            None if range == "*" => parts.push(format!("*{suffix}")),
            None => parts.push(format!("{}{suffix}", shift(range)?)),
        }
    }
    Ok(parts.join(","))
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl FromStr for CronSchedule {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

/// "Next occurrence" cursor over a [`CronSchedule`].
///
/// The first occurrence is the simulation start itself unless it is skipped.
/// Occurrences missed between two grid dates collapse into one trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceCursor {
    schedule: CronSchedule,
    initial: Option<NaiveDateTime>,
    current: Option<NaiveDateTime>,
}

impl RebalanceCursor {
    pub fn new(schedule: CronSchedule, start: NaiveDateTime, skip_on_init: bool) -> Self {
        let initial = if skip_on_init {
            schedule.next_after(start)
        } else {
            Some(start)
        };
        Self {
            schedule,
            initial,
            current: initial,
        }
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    pub fn current(&self) -> Option<NaiveDateTime> {
        self.current
    }

    /// Whether `dt` reached the pending occurrence.
    pub fn is_due(&self, dt: NaiveDateTime) -> bool {
        self.current.is_some_and(|c| dt >= c)
    }

    /// Move to the first occurrence strictly after `dt`.
    pub fn advance_past(&mut self, dt: NaiveDateTime) {
        self.current = self.schedule.next_after(dt);
    }

    /// Restore the state the cursor had right after processing `prev`.
    ///
    /// `rebuild_from == strategy_start` resets to the initial occurrence.
    pub fn rewind(&mut self, strategy_start: NaiveDateTime, rebuild_from: NaiveDateTime, prev: NaiveDateTime) {
        self.current = match self.initial {
            _ if rebuild_from <= strategy_start => self.initial,
            Some(initial) if initial > prev => Some(initial),
            Some(_) => self.schedule.next_after(prev),
            None => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_timestamp;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn monthly_occurrences() {
        let cron = CronSchedule::parse("0 0 1 * *").unwrap();
        assert_eq!(cron.next_after(ts("2021-01-01")), Some(ts("2021-02-01")));
        assert_eq!(cron.next_after(ts("2021-01-15 13:20")), Some(ts("2021-02-01")));
        assert_eq!(cron.next_after(ts("2021-12-31")), Some(ts("2022-01-01")));
    }

    #[test]
    fn steps_and_ranges() {
        let cron = CronSchedule::parse("*/15 9-10 * * *").unwrap();
        assert_eq!(cron.next_after(ts("2021-01-01 09:00")), Some(ts("2021-01-01 09:15")));
        assert_eq!(cron.next_after(ts("2021-01-01 10:45")), Some(ts("2021-01-02 09:00")));
    }

    #[test]
    fn weekday_names() {
        // 2021-01-04 is a Monday
        let cron = CronSchedule::parse("0 0 * * MON").unwrap();
        assert_eq!(cron.next_after(ts("2021-01-01")), Some(ts("2021-01-04")));
        let sunday = CronSchedule::parse("0 0 * * 7").unwrap();
        assert_eq!(sunday.next_after(ts("2021-01-01")), Some(ts("2021-01-03")));
    }

    #[test]
    fn month_names_and_lists() {
        let cron = CronSchedule::parse("0 12 1 jan,jul *").unwrap();
        assert_eq!(cron.next_after(ts("2021-01-02")), Some(ts("2021-07-01 12:00")));
    }

    #[test]
    fn restricted_dom_and_dow_match_either() {
        // the 15th or any Friday; 2021-01-08 is a Friday
        let cron = CronSchedule::parse("0 0 15 * fri").unwrap();
        assert_eq!(cron.next_after(ts("2021-01-01")), Some(ts("2021-01-08")));
        assert_eq!(cron.next_after(ts("2021-01-13")), Some(ts("2021-01-15")));
    }

    #[test]
    fn numeric_weekdays_use_five_field_numbering() {
        // 2021-01-01 is a Friday
        let weekdays = CronSchedule::parse("0 0 * * 1-5").unwrap();
        assert_eq!(weekdays.next_after(ts("2021-01-01")), Some(ts("2021-01-04")));
        let weekend = CronSchedule::parse("0 0 * * 6-7").unwrap();
        assert_eq!(weekend.next_after(ts("2021-01-01")), Some(ts("2021-01-02")));
        assert_eq!(weekend.next_after(ts("2021-01-02")), Some(ts("2021-01-03")));
        assert_eq!(weekend.next_after(ts("2021-01-03")), Some(ts("2021-01-09")));
        let sunday = CronSchedule::parse("0 0 * * 0").unwrap();
        assert_eq!(sunday.next_after(ts("2021-01-01")), Some(ts("2021-01-03")));
    }

    #[test]
    fn impossible_date_has_no_occurrence() {
        let cron = CronSchedule::parse("0 0 30 2 *").unwrap();
        assert_eq!(cron.next_after(ts("2021-01-01")), None);
    }

    #[test]
    fn invalid_expressions() {
        for expr in ["0 0 1 *", "60 0 * * *", "0 0 0 * *", "*/0 * * * *", "a b c d e", "0 0 * * 8"] {
            assert!(
                matches!(CronSchedule::parse(expr), Err(ConfigurationError::InvalidCron { .. })),
                "{expr} should be rejected"
            );
        }
    }

    #[test]
    fn cursor_fires_on_start_unless_skipped() {
        let cron = CronSchedule::parse("0 0 1 * *").unwrap();
        let fire = RebalanceCursor::new(cron.clone(), ts("2021-01-10"), false);
        assert_eq!(fire.current(), Some(ts("2021-01-10")));
        let skip = RebalanceCursor::new(cron, ts("2021-01-10"), true);
        assert_eq!(skip.current(), Some(ts("2021-02-01")));
        assert!(!skip.is_due(ts("2021-01-31")));
        assert!(skip.is_due(ts("2021-02-01")));
    }

    #[test]
    fn advance_coalesces_missed_occurrences() {
        let cron = CronSchedule::parse("0 * * * *").unwrap();
        let mut cursor = RebalanceCursor::new(cron, ts("2021-01-01"), false);
        cursor.advance_past(ts("2021-01-02"));
        assert_eq!(cursor.current(), Some(ts("2021-01-02 01:00")));
    }

    #[test]
    fn rewind_restores_state_after_prev() {
        let cron = CronSchedule::parse("0 0 1 * *").unwrap();
        let start = ts("2021-01-01");
        let mut cursor = RebalanceCursor::new(cron, start, true);
        cursor.advance_past(ts("2021-02-01"));
        cursor.advance_past(ts("2021-03-01"));

        cursor.rewind(start, ts("2021-02-15"), ts("2021-02-14"));
        assert_eq!(cursor.current(), Some(ts("2021-03-01")));

        cursor.rewind(start, ts("2021-01-20"), ts("2021-01-19"));
        assert_eq!(cursor.current(), Some(ts("2021-02-01")));

        cursor.rewind(start, start, start);
        assert_eq!(cursor.current(), Some(ts("2021-02-01")));
    }
}
