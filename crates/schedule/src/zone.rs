//! Source/target timezones: fixed UTC offsets or IANA zones.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::TimeOfDay;
use crate::error::ScheduleError;

/// Layout of every rendered delivery time.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

static OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:UTC|GMT)?([+-])(\d{1,2})(?::?(\d{2}))?$").expect("utc offset regex")
});

/// A timezone used to interpret input times or render display times.
///
/// `Fixed` never observes daylight saving; `Named` resolves through the tz
/// database.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl Zone {
    pub fn utc() -> Self {
        Zone::Fixed(Utc.fix())
    }

    /// Whole-hour fixed offset east of UTC (negative = west).
    pub fn fixed_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours * 3_600).map(Zone::Fixed)
    }

    /// Interpret calendar fields as wall-clock time in this zone and return
    /// the UTC instant.
    ///
    /// Named zones resolve ambiguous local times (DST fall-back) to the
    /// earlier instant and shift non-existent ones (spring-forward gap)
    /// forward by one hour.
    pub fn to_absolute_instant(&self, date: NaiveDate, time: TimeOfDay) -> DateTime<Utc> {
        let naive = date.and_time(NaiveTime::default())
            + Duration::hours(i64::from(time.hours))
            + Duration::minutes(i64::from(time.minutes));

        match self {
            Zone::Fixed(offset) => {
                let shifted = naive - Duration::seconds(i64::from(offset.local_minus_utc()));
                Utc.from_utc_datetime(&shifted)
            }
            Zone::Named(tz) => resolve_named(tz, naive),
        }
    }

    /// Render an instant as `YYYY-MM-DD HH:MM` wall-clock time in this zone.
    pub fn display(&self, instant: DateTime<Utc>) -> String {
        match self {
            Zone::Fixed(offset) => instant.with_timezone(offset).format(DISPLAY_FORMAT).to_string(),
            Zone::Named(tz) => instant.with_timezone(tz).format(DISPLAY_FORMAT).to_string(),
        }
    }
}

fn resolve_named(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(local) = tz.from_local_datetime(&naive).earliest() {
        return local.with_timezone(&Utc);
    }
    tz.from_local_datetime(&(naive + Duration::hours(1)))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

impl FromStr for Zone {
    type Err = ScheduleError;

    /// Accepts `UTC`/`Z`/`GMT`, signed hours (`-8`, `5.5`), `+08:00`/`-0800`,
    /// or an IANA name such as `America/Los_Angeles`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("utc") || s.eq_ignore_ascii_case("gmt") || s == "Z" {
            return Ok(Zone::utc());
        }

        if let Some(caps) = OFFSET.captures(s) {
            let hours: i32 = caps[2].parse().unwrap_or(0);
            let minutes: i32 = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
            let sign = if &caps[1] == "-" { -1 } else { 1 };
            return FixedOffset::east_opt(sign * (hours * 3_600 + minutes * 60))
                .map(Zone::Fixed)
                .ok_or_else(|| ScheduleError::OffsetOutOfRange(s.to_string()));
        }

        if let Ok(hours) = s.parse::<f64>() {
            return FixedOffset::east_opt((hours * 3_600.0).round() as i32)
                .map(Zone::Fixed)
                .ok_or_else(|| ScheduleError::OffsetOutOfRange(s.to_string()));
        }

        s.parse::<Tz>()
            .map(Zone::Named)
            .map_err(|_| ScheduleError::UnknownZone(s.to_string()))
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Fixed(offset) => write!(f, "{offset}"),
            Zone::Named(tz) => f.write_str(tz.name()),
        }
    }
}

impl Serialize for Zone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Zone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
