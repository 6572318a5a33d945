//! Calendar-date parsing for spreadsheet cells.

use std::sync::LazyLock;

use chrono::{DateTime, Days, NaiveDate};
use regex::Regex;

/// Day 0 of the spreadsheet serial-date convention.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Numeric cells are only read as serials inside this window
/// (roughly 1902-09-26 ..= 2173-10-14).
const SERIAL_MIN: f64 = 1_000.0;
const SERIAL_MAX: f64 = 100_000.0;

static YEAR_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})(?:\D|$)").expect("year-first date regex")
});

static MONTH_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[-/](\d{1,2})[-/](\d{4})(?:\D|$)").expect("month-first date regex")
});

static COMPACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").expect("compact date regex"));

/// Generic textual layouts tried after the structured patterns.
const FALLBACK_FORMATS: &[&str] = &[
    "%Y年%m月%d日",
    "%Y.%m.%d",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%a, %d %b %Y",
];

/// Parse a raw date cell into a calendar date.
///
/// Accepted, in order:
/// 1. a numeric day count from 1899-12-30 (fraction ignored) when it falls in
///    the plausible serial window
/// 2. `YYYY-M-D` / `YYYY/M/D` (trailing time text is ignored)
/// 3. `M-D-YYYY` / `M/D/YYYY`
/// 4. compact `YYYYMMDD`
/// 5. RFC 3339 / RFC 2822 timestamps and a handful of textual layouts
///
/// Returns `None` when nothing matches or the fields do not form a real date.
/// Callers treat `None` as "no date given", never as an error.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(value) = raw.parse::<f64>() {
        if value.is_finite() && (SERIAL_MIN..=SERIAL_MAX).contains(&value) {
            return from_serial(value);
        }
    }

    if let Some(caps) = YEAR_FIRST.captures(raw) {
        return ymd(&caps[1], &caps[2], &caps[3]);
    }

    if let Some(caps) = MONTH_FIRST.captures(raw) {
        return ymd(&caps[3], &caps[1], &caps[2]);
    }

    if let Some(caps) = COMPACT.captures(raw) {
        return ymd(&caps[1], &caps[2], &caps[3]);
    }

    fallback(raw)
}

fn from_serial(value: f64) -> Option<NaiveDate> {
    let (y, m, d) = SERIAL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?;
    epoch.checked_add_days(Days::new(value.trunc() as u64))
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn fallback(raw: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local().date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.naive_local().date());
    }
    FALLBACK_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
