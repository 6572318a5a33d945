//! Delivery schedule computation.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::parse_calendar_date;
use crate::clock::parse_time_of_day;
use crate::zone::Zone;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// When a task should be delivered, and how that reads to a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Absolute delivery instant. Never in the past relative to the `now`
    /// it was computed against.
    pub scheduled_for: DateTime<Utc>,
    /// `scheduled_for` rendered in the target zone.
    pub display: String,
    /// Hours from `now` to `scheduled_for`, rounded to two decimals.
    pub delay_hours: f64,
}

impl Schedule {
    /// Deliver at `now`.
    pub fn immediate(target: &Zone, now: DateTime<Utc>) -> Self {
        Self {
            scheduled_for: now,
            display: target.display(now),
            delay_hours: 0.0,
        }
    }

    fn at(instant: DateTime<Utc>, target: &Zone, now: DateTime<Utc>) -> Self {
        Self {
            scheduled_for: instant,
            display: target.display(instant),
            delay_hours: round_hours((instant - now).num_milliseconds()),
        }
    }
}

/// Compute the delivery schedule for a raw date/time pair expressed in
/// `source`, rendered in `target`.
///
/// A missing or unparseable date, or an instant at or before `now`, yields an
/// immediate schedule. A missing time means midnight.
pub fn compute_schedule(
    raw_date: &str,
    raw_time: &str,
    source: &Zone,
    target: &Zone,
    now: DateTime<Utc>,
) -> Schedule {
    let Some(date) = parse_calendar_date(raw_date) else {
        return Schedule::immediate(target, now);
    };

    let instant = source.to_absolute_instant(date, parse_time_of_day(raw_time));
    if instant <= now {
        return Schedule::immediate(target, now);
    }

    Schedule::at(instant, target, now)
}

/// Schedule `delay_hours` after `now`; non-positive or non-finite delays are
/// immediate.
///
/// Returns `None` when the delay lands outside the representable time range.
pub fn schedule_after_delay(delay_hours: f64, target: &Zone, now: DateTime<Utc>) -> Option<Schedule> {
    if !delay_hours.is_finite() || delay_hours <= 0.0 {
        return Some(Schedule::immediate(target, now));
    }
    let millis = (delay_hours * MILLIS_PER_HOUR).round() as i64;
    let instant = TimeDelta::try_milliseconds(millis).and_then(|d| now.checked_add_signed(d))?;
    Some(Schedule::at(instant, target, now))
}

/// A task is due once its instant is now or in the past.
pub fn is_due(scheduled_for: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    scheduled_for <= now
}

fn round_hours(millis: i64) -> f64 {
    (millis as f64 / MILLIS_PER_HOUR * 100.0).round() / 100.0
}
