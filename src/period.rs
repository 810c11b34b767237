//! Date parsing, period keys and the dashboard's default date ranges.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime};

use crate::models::{DateRange, Granularity};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse the date part of a record's date field.
///
/// Timestamps carrying an offset keep the calendar date of that offset.
pub fn parse_record_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive());
    }

    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|timestamp| timestamp.date())
}

pub fn period_key(date: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => date.format("%Y-%m-%d").to_string(),
        // Calendar week of the month, not an ISO week.
        Granularity::Week => format!(
            "{:04}-{:02}-W{}",
            date.year(),
            date.month(),
            date.day().div_ceil(7)
        ),
        Granularity::Month => format!("{:04}-{:02}", date.year(), date.month()),
        Granularity::Year => format!("{:04}", date.year()),
    }
}

/// Period key for a raw date string, or `None` when the date is unusable.
pub fn to_period_key(raw: &str, granularity: Granularity) -> Option<String> {
    parse_record_date(raw).map(|date| period_key(date, granularity))
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    // Day 1 exists for every month chrono can represent.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

/// First day of the month `offset` months away from `date`'s month.
fn shift_month(date: NaiveDate, offset: i32) -> NaiveDate {
    let index = date.year() * 12 + date.month0() as i32 + offset;
    first_of_month(index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

fn last_of_month(date: NaiveDate) -> NaiveDate {
    shift_month(date, 1) - Duration::days(1)
}

/// The whole calendar month before `today`'s month.
pub fn previous_month_range(today: NaiveDate) -> DateRange {
    let start = shift_month(today, -1);
    DateRange::new(start, last_of_month(start))
}

pub fn current_month_range(today: NaiveDate) -> DateRange {
    let start = shift_month(today, 0);
    DateRange::new(start, last_of_month(start))
}

/// From the first day of the month `months_back` months ago through the end of
/// the current month.
pub fn range_for_months(today: NaiveDate, months_back: u32) -> DateRange {
    let start = shift_month(today, -(months_back as i32));
    DateRange::new(start, last_of_month(shift_month(today, 0)))
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
