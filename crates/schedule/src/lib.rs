//! Temporal normalization for campaign scheduling.
//!
//! Turns loosely formatted spreadsheet date/time cells into absolute
//! delivery instants:
//! - [`parse_calendar_date`] / [`parse_time_of_day`] read heterogeneous cells
//!   (date serials, textual dates, 12h/24h clock strings)
//! - [`Zone`] converts wall-clock fields to UTC and renders display strings
//! - [`compute_schedule`] combines both into a [`Schedule`], collapsing
//!   anything not strictly in the future to "send now"
//!
//! Nothing in here returns an error for bad cell contents; unparseable input
//! degrades to "no date" / midnight / no delay.

pub mod calendar;
pub mod clock;
pub mod error;
pub mod plan;
pub mod zone;

#[cfg(test)]
mod tests;

pub use calendar::parse_calendar_date;
pub use clock::{parse_delay_hours, parse_time_of_day, TimeOfDay};
pub use error::ScheduleError;
pub use plan::{compute_schedule, is_due, schedule_after_delay, Schedule};
pub use zone::Zone;
