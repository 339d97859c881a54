use anyhow::{Context, Result};
use chrono::{Datelike, Months, NaiveDate};

/// First and last day (both inclusive) of the calendar month containing `date`.
pub(crate) fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(first);
    (first, last)
}

/// "YYYY-MM" key used for budgets and month filters.
pub(crate) fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

pub(crate) fn current_month() -> String {
    month_key(chrono::Local::now().date_naive())
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))
}

/// Validate a "YYYY-MM" string and return its first day.
pub(crate) fn parse_month(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{s}', expected YYYY-MM"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_bounds_mid_month() {
        assert_eq!(month_bounds(ymd(2024, 1, 15)), (ymd(2024, 1, 1), ymd(2024, 1, 31)));
    }

    #[test]
    fn test_month_bounds_leap_february() {
        assert_eq!(month_bounds(ymd(2024, 2, 29)), (ymd(2024, 2, 1), ymd(2024, 2, 29)));
        assert_eq!(month_bounds(ymd(2023, 2, 1)), (ymd(2023, 2, 1), ymd(2023, 2, 28)));
    }

    #[test]
    fn test_month_bounds_december() {
        assert_eq!(month_bounds(ymd(2024, 12, 31)), (ymd(2024, 12, 1), ymd(2024, 12, 31)));
    }

    #[test]
    fn test_month_key() {
        assert_eq!(month_key(ymd(2024, 3, 9)), "2024-03");
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("2024-06").unwrap(), ymd(2024, 6, 1));
        assert!(parse_month("2024-13").is_err());
        assert!(parse_month("June").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date(" 2024-06-30 ").unwrap(), ymd(2024, 6, 30));
        assert!(parse_date("06/30/2024").is_err());
    }
}
