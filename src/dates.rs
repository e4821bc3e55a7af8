use chrono::{Datelike, NaiveDate, Weekday};

/// Storage key for a calendar month, e.g. `2025-03`.
pub fn month_key(year: i32, month: u32) -> String {
    format!("{year}-{month:02}")
}

/// Every Monday, Wednesday and Thursday of the month, ascending, as `YYYY-MM-DD`.
///
/// Dates are plain calendar dates; no clock or timezone is consulted.
pub fn meeting_dates_of(year: i32, month: u32) -> Vec<String> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };

    first
        .iter_days()
        .take_while(|date| date.month() == month)
        .filter(|date| is_meeting_day(date.weekday()))
        .map(date_key)
        .collect()
}

pub fn is_wednesday(date: &str) -> bool {
    parse_date(date).is_some_and(|date| date.weekday() == Weekday::Wed)
}

pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

pub fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
}

fn is_meeting_day(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Mon | Weekday::Wed | Weekday::Thu)
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
