//! Five-field cron expressions for recurring jobs.
//!
//! Supported syntax per field (minute, hour, day-of-month, month,
//! day-of-week): `*`, steps `*/n`, ranges `a-b`, range steps `a-b/n`,
//! and lists `a,b,c`. Day-of-week runs Sunday = 0 with 7 accepted as an
//! alias. When both day fields are restricted, a day matches if either
//! does (standard cron union semantics).

use chrono::{DateTime, Datelike, TimeDelta, TimeZone, Timelike, Utc};

use crate::error::{QueueError, QueueResult};

const MINUTE_BOUNDS: (u8, u8) = (0, 59);
const HOUR_BOUNDS: (u8, u8) = (0, 23);
const DOM_BOUNDS: (u8, u8) = (1, 31);
const MONTH_BOUNDS: (u8, u8) = (1, 12);
const DOW_BOUNDS: (u8, u8) = (0, 7);

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: Vec<u8>,
    hours: Vec<u8>,
    days_of_month: Vec<u8>,
    months: Vec<u8>,
    days_of_week: Vec<u8>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parse a five-field cron expression.
    pub fn parse(expr: &str) -> QueueResult<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(QueueError::Validation(format!(
                "invalid cron expression '{}': expected 5 fields, got {}",
                expr,
                fields.len()
            )));
        }

        let invalid = |msg: String| {
            QueueError::Validation(format!("invalid cron expression '{}': {}", expr, msg))
        };

        Ok(Self {
            minutes: parse_field(fields[0], MINUTE_BOUNDS, false).map_err(invalid)?,
            hours: parse_field(fields[1], HOUR_BOUNDS, false).map_err(invalid)?,
            days_of_month: parse_field(fields[2], DOM_BOUNDS, false).map_err(invalid)?,
            months: parse_field(fields[3], MONTH_BOUNDS, false).map_err(invalid)?,
            days_of_week: parse_field(fields[4], DOW_BOUNDS, true).map_err(invalid)?,
            dom_restricted: fields[2] != "*",
            dow_restricted: fields[4] != "*",
        })
    }

    /// Smallest minute-aligned timestamp strictly after `from` matching
    /// the expression, or `None` when no day matches within the search
    /// horizon (an impossible date combination such as February 30th).
    pub fn next(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = from.timestamp();
        let mut t = DateTime::<Utc>::from_timestamp(start - start.rem_euclid(60) + 60, 0)?;

        // Bounded walk over calendar fields, coarse to fine. The cap is
        // generous: even a single matching day per year costs well under
        // a thousand steps across the four-year leap cycle.
        for _ in 0..200_000 {
            if !self.months.contains(&(t.month() as u8)) {
                t = next_month_start(t)?;
                continue;
            }
            if !self.day_matches(t) {
                t = next_day_start(t)?;
                continue;
            }
            if !self.hours.contains(&(t.hour() as u8)) {
                t = next_hour_start(t)?;
                continue;
            }
            if !self.minutes.contains(&(t.minute() as u8)) {
                t = t + TimeDelta::minutes(1);
                continue;
            }
            return Some(t);
        }

        None
    }

    fn day_matches(&self, t: DateTime<Utc>) -> bool {
        let dom = self.days_of_month.contains(&(t.day() as u8));
        let dow = self
            .days_of_week
            .contains(&(t.weekday().num_days_from_sunday() as u8));

        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

fn next_boundary(ts: i64, period: i64) -> i64 {
    ts - ts.rem_euclid(period) + period
}

fn next_hour_start(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(next_boundary(t.timestamp(), 3600), 0)
}

fn next_day_start(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(next_boundary(t.timestamp(), 86_400), 0)
}

fn next_month_start(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

/// Expand one field into its sorted set of matching values.
fn parse_field(field: &str, bounds: (u8, u8), is_dow: bool) -> Result<Vec<u8>, String> {
    let (min, max) = bounds;
    let mut values = std::collections::BTreeSet::new();

    for term in field.split(',') {
        if term.is_empty() {
            return Err(format!("empty term in field '{}'", field));
        }

        let (range_part, step) = match term.split_once('/') {
            Some((range_part, step_raw)) => {
                let step: u8 = step_raw
                    .parse()
                    .map_err(|_| format!("invalid step '{}'", step_raw))?;
                if step == 0 {
                    return Err(format!("step cannot be zero in '{}'", term));
                }
                (range_part, step)
            }
            None => (term, 1),
        };

        let (lo, hi) = if range_part == "*" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            (parse_value(a, min, max)?, parse_value(b, min, max)?)
        } else {
            let value = parse_value(range_part, min, max)?;
            // A bare value with a step runs to the end of the field range
            if term.contains('/') {
                (value, max)
            } else {
                (value, value)
            }
        };

        if lo > hi {
            return Err(format!("range '{}' is inverted", range_part));
        }

        let mut v = u16::from(lo);
        while v <= u16::from(hi) {
            let value = v as u8;
            values.insert(if is_dow && value == 7 { 0 } else { value });
            v += u16::from(step);
        }
    }

    Ok(values.into_iter().collect())
}

fn parse_value(raw: &str, min: u8, max: u8) -> Result<u8, String> {
    let value: u8 = raw
        .parse()
        .map_err(|_| format!("invalid field value '{}'", raw))?;
    if value < min || value > max {
        return Err(format!(
            "field value {} out of range {}-{}",
            value, min, max
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_every_minute() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        // 2024-03-15 is a Friday
        let next = schedule.next(at(2024, 3, 15, 10, 5, 30)).unwrap();
        assert_eq!(next, at(2024, 3, 15, 10, 6, 0));
    }

    #[test]
    fn test_next_is_strictly_after_from() {
        let schedule = CronSchedule::parse("6 10 * * *").unwrap();
        let from = at(2024, 3, 15, 10, 6, 0);
        let next = schedule.next(from).unwrap();
        assert_eq!(next, at(2024, 3, 16, 10, 6, 0));
    }

    #[test]
    fn test_minute_steps() {
        let schedule = CronSchedule::parse("*/15 * * * *").unwrap();
        let next = schedule.next(at(2024, 3, 15, 10, 5, 0)).unwrap();
        assert_eq!(next, at(2024, 3, 15, 10, 15, 0));

        let next = schedule.next(at(2024, 3, 15, 10, 45, 0)).unwrap();
        assert_eq!(next, at(2024, 3, 15, 11, 0, 0));
    }

    #[test]
    fn test_minute_list() {
        let schedule = CronSchedule::parse("0,30 * * * *").unwrap();
        let next = schedule.next(at(2024, 3, 15, 10, 5, 0)).unwrap();
        assert_eq!(next, at(2024, 3, 15, 10, 30, 0));
    }

    #[test]
    fn test_range_with_step() {
        let schedule = CronSchedule::parse("10-30/10 * * * *").unwrap();
        let next = schedule.next(at(2024, 3, 15, 10, 5, 0)).unwrap();
        assert_eq!(next, at(2024, 3, 15, 10, 10, 0));

        let next = schedule.next(at(2024, 3, 15, 10, 25, 0)).unwrap();
        assert_eq!(next, at(2024, 3, 15, 10, 30, 0));
    }

    #[test]
    fn test_weekday_mornings() {
        let schedule = CronSchedule::parse("0 9 * * 1-5").unwrap();
        // Friday 10:05 → the weekend is skipped, Monday 09:00
        let next = schedule.next(at(2024, 3, 15, 10, 5, 0)).unwrap();
        assert_eq!(next, at(2024, 3, 18, 9, 0, 0));
    }

    #[test]
    fn test_first_of_month() {
        let schedule = CronSchedule::parse("30 14 1 * *").unwrap();
        let next = schedule.next(at(2024, 3, 15, 10, 5, 0)).unwrap();
        assert_eq!(next, at(2024, 4, 1, 14, 30, 0));
    }

    #[test]
    fn test_sunday_as_zero_and_seven() {
        let zero = CronSchedule::parse("0 0 * * 0").unwrap();
        let seven = CronSchedule::parse("0 0 * * 7").unwrap();
        assert_eq!(zero, seven);

        let next = zero.next(at(2024, 3, 15, 10, 5, 0)).unwrap();
        assert_eq!(next, at(2024, 3, 17, 0, 0, 0));
    }

    #[test]
    fn test_dom_dow_union() {
        // Standard cron: day 13 OR Friday when both fields are restricted
        let schedule = CronSchedule::parse("0 12 13 * 5").unwrap();
        let next = schedule.next(at(2024, 3, 15, 10, 5, 0)).unwrap();
        // March 15th 2024 is a Friday, so it matches same-day
        assert_eq!(next, at(2024, 3, 15, 12, 0, 0));

        let next = schedule.next(at(2024, 3, 16, 10, 5, 0)).unwrap();
        // Neither the 17th-21st (non-Friday, non-13th)... the 22nd is Friday
        assert_eq!(next, at(2024, 3, 22, 12, 0, 0));
    }

    #[test]
    fn test_month_restriction() {
        let schedule = CronSchedule::parse("0 0 1 1 *").unwrap();
        let next = schedule.next(at(2024, 3, 15, 10, 5, 0)).unwrap();
        assert_eq!(next, at(2025, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_impossible_date_returns_none() {
        let schedule = CronSchedule::parse("0 0 30 2 *").unwrap();
        assert!(schedule.next(at(2024, 3, 15, 0, 0, 0)).is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(CronSchedule::parse("* * * *").is_err());
        assert!(CronSchedule::parse("* * * * * *").is_err());
        assert!(CronSchedule::parse("60 * * * *").is_err());
        assert!(CronSchedule::parse("* 24 * * *").is_err());
        assert!(CronSchedule::parse("* * 0 * *").is_err());
        assert!(CronSchedule::parse("* * * 13 *").is_err());
        assert!(CronSchedule::parse("* * * * 8").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("5-2 * * * *").is_err());
        assert!(CronSchedule::parse("a * * * *").is_err());
        assert!(CronSchedule::parse("1,,2 * * * *").is_err());
    }

    #[test]
    fn test_past_expression_still_yields_future_time() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let long_ago = at(2001, 1, 1, 0, 0, 0);
        let next = schedule.next(long_ago).unwrap();
        assert!(next > long_ago);
        assert_eq!(next, at(2001, 1, 1, 0, 1, 0));
    }
}
