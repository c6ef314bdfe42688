//! Calendar-date helpers
//!
//! Dates are `NaiveDate` everywhere inside the engine. The `YYYY-MM-DD` string
//! form only exists at the boundary (CLI input, stored documents), and
//! `parse_date`/`format_date` are the only places it is read or written.
//! "Today" is the local calendar date, never the UTC date, so a user late in
//! the evening does not see tomorrow's schedule.

use chrono::{Datelike, Duration, Local, NaiveDate};

use crate::error::{Error, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a strict, zero-padded `YYYY-MM-DD` date
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let trimmed = s.trim();
    // chrono accepts "2024-1-5"; lexicographic ordering elsewhere needs padding
    if trimmed.len() != 10 {
        return Err(Error::Validation(format!(
            "Invalid date '{}' (use YYYY-MM-DD)",
            s
        )));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| Error::Validation(format!("Invalid date '{}' (use YYYY-MM-DD)", s)))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Current local calendar date
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Longest forward window (about a century) the projections will walk
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Shift by whole days, saturating at the ends of the calendar
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

/// Bound a caller-supplied window to `0..=MAX_WINDOW_DAYS`
pub fn clamp_window(days: i64) -> i64 {
    days.clamp(0, MAX_WINDOW_DAYS)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Add calendar months, clamping the day to the target month's length
///
/// Jan 31 + 1 month is Feb 28 (or 29), not Mar 3.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let index = date.year() * 12 + date.month0() as i32 + months;
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

/// Move a date to the given day of its month, clamped to the month length
pub fn pin_to_day(date: NaiveDate, day: u32) -> NaiveDate {
    let day = day.clamp(1, days_in_month(date.year(), date.month()));
    date.with_day(day).unwrap_or(date)
}

/// Signed number of days from `from` to `to`
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// First and last day of a month
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = NaiveDate::from_ymd_opt(year, month, days_in_month(year, month))?;
    Some((first, last))
}

/// Inclusive iterator over every day from `start` to `end`
pub fn date_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let len = (end - start).num_days().max(-1) + 1;
    (0..len).map(move |offset| start + Duration::days(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_date_strict() {
        assert_eq!(parse_date("2024-01-05").unwrap(), d(2024, 1, 5));
        assert!(parse_date("2024-1-5").is_err());
        assert!(parse_date("01/05/2024").is_err());
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn test_add_days_saturates() {
        assert_eq!(add_days(d(2024, 2, 28), 2), d(2024, 3, 1));
        assert_eq!(add_days(d(2024, 1, 1), 100_000_000), NaiveDate::MAX);
        assert_eq!(add_days(d(2024, 1, 1), i64::MAX), NaiveDate::MAX);
        assert_eq!(add_days(d(2024, 1, 1), i64::MIN), NaiveDate::MIN);
        assert_eq!(add_days(NaiveDate::MAX, 1), NaiveDate::MAX);
    }

    #[test]
    fn test_clamp_window() {
        assert_eq!(clamp_window(-5), 0);
        assert_eq!(clamp_window(30), 30);
        assert_eq!(clamp_window(100_000_000), MAX_WINDOW_DAYS);
    }

    #[test]
    fn test_format_date_zero_padded() {
        assert_eq!(format_date(d(2024, 3, 7)), "2024-03-07");
    }

    #[test]
    fn test_add_months_clamps_to_month_end() {
        assert_eq!(add_months(d(2024, 1, 31), 1), d(2024, 2, 29));
        assert_eq!(add_months(d(2023, 1, 31), 1), d(2023, 2, 28));
        assert_eq!(add_months(d(2024, 11, 15), 3), d(2025, 2, 15));
        assert_eq!(add_months(d(2024, 1, 15), -1), d(2023, 12, 15));
    }

    #[test]
    fn test_pin_to_day() {
        assert_eq!(pin_to_day(d(2024, 2, 10), 31), d(2024, 2, 29));
        assert_eq!(pin_to_day(d(2024, 4, 1), 15), d(2024, 4, 15));
    }

    #[test]
    fn test_date_range_inclusive() {
        let days: Vec<_> = date_range(d(2024, 1, 30), d(2024, 2, 2)).collect();
        assert_eq!(days.len(), 4);
        assert_eq!(days[3], d(2024, 2, 2));
        assert_eq!(date_range(d(2024, 2, 2), d(2024, 1, 1)).count(), 0);
    }

    #[test]
    fn test_days_between_and_bounds() {
        assert_eq!(days_between(d(2024, 1, 1), d(2024, 1, 11)), 10);
        assert_eq!(
            month_bounds(2024, 2),
            Some((d(2024, 2, 1), d(2024, 2, 29)))
        );
        assert_eq!(month_bounds(2024, 13), None);
    }
}
