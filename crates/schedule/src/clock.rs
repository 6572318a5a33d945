//! Time-of-day and delay parsing.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const MINUTES_PER_DAY: f64 = 1_440.0;

static TWELVE_HOUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2}):(\d{2})(?::\d{2})?\s*([ap])\.?m\.?$").expect("12h clock regex")
});

static TWENTY_FOUR_HOUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2})(?::\d{2})?$").expect("24h clock regex")
});

/// Wall-clock hours and minutes; the default is midnight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hours: u32,
    pub minutes: u32,
}

impl TimeOfDay {
    pub fn new(hours: u32, minutes: u32) -> Option<Self> {
        (hours < 24 && minutes < 60).then_some(Self { hours, minutes })
    }
}

/// Parse a raw time cell.
///
/// Accepts a fractional-day serial (`0 <= x < 1`, e.g. `0.375` for 09:00),
/// `H:MM[:SS]`, or `H:MM[:SS] AM|PM`. Anything else, including out-of-range
/// fields, is midnight.
pub fn parse_time_of_day(raw: &str) -> TimeOfDay {
    let raw = raw.trim();

    if let Ok(fraction) = raw.parse::<f64>() {
        if (0.0..1.0).contains(&fraction) {
            let total = (fraction * MINUTES_PER_DAY).round() as u32;
            return TimeOfDay {
                hours: (total / 60) % 24,
                minutes: total % 60,
            };
        }
        return TimeOfDay::default();
    }

    if let Some(caps) = TWELVE_HOUR.captures(raw) {
        let hours: u32 = caps[1].parse().unwrap_or(0);
        let minutes: u32 = caps[2].parse().unwrap_or(0);
        if !(1..=12).contains(&hours) {
            return TimeOfDay::default();
        }
        let pm = caps[3].eq_ignore_ascii_case("p");
        let hours = if pm { hours % 12 + 12 } else { hours % 12 };
        return TimeOfDay::new(hours, minutes).unwrap_or_default();
    }

    if let Some(caps) = TWENTY_FOUR_HOUR.captures(raw) {
        let hours: u32 = caps[1].parse().unwrap_or(0);
        let minutes: u32 = caps[2].parse().unwrap_or(0);
        return TimeOfDay::new(hours, minutes).unwrap_or_default();
    }

    TimeOfDay::default()
}

/// Parse an explicit delay in hours. Negative, zero, non-finite and
/// malformed values all mean "no delay".
pub fn parse_delay_hours(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(hours) if hours.is_finite() && hours > 0.0 => hours,
        _ => 0.0,
    }
}
