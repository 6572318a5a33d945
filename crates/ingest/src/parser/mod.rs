//! Row → `RecipientTask` conversion.

pub mod aliases;
#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use tracing::debug;

use mailcast_core::{is_plausible_address, RecipientTask};
use mailcast_schedule::{
    compute_schedule, parse_calendar_date, parse_delay_hours, schedule_after_delay, Zone,
};

use crate::error::{IngestError, RowError};
use crate::tabular::Row;

/// Sheet rows are reported 1-based with the header on row 1.
const FIRST_DATA_ROW: usize = 2;

/// Result of a parse that produced at least one task.
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub tasks: Vec<RecipientTask>,
    /// Rows carrying a sent marker.
    pub skipped: usize,
    /// Rows excluded for missing fields, a bad address or an unusable delay.
    pub rejected: Vec<RowError>,
}

enum RowOutcome {
    Task(Box<RecipientTask>),
    Skipped,
    Rejected(RowError),
}

/// Parse every row, keeping the valid ones.
///
/// Partial success is success; the rejected rows are only turned into an
/// error when no task survives.
pub fn parse_rows(
    rows: &[Row],
    source: &Zone,
    target: &Zone,
    now: DateTime<Utc>,
) -> Result<ParsedBatch, IngestError> {
    let mut batch = ParsedBatch::default();

    for (idx, row) in rows.iter().enumerate() {
        match parse_row(row, idx + FIRST_DATA_ROW, source, target, now) {
            RowOutcome::Task(task) => batch.tasks.push(*task),
            RowOutcome::Skipped => batch.skipped += 1,
            RowOutcome::Rejected(err) => {
                debug!(row = err.row, reason = %err.message, "row rejected");
                batch.rejected.push(err);
            }
        }
    }

    if batch.tasks.is_empty() {
        let reason = if batch.rejected.is_empty() {
            if batch.skipped > 0 {
                format!("all {} row(s) already marked as sent", batch.skipped)
            } else {
                "sheet has no data rows".to_string()
            }
        } else {
            batch
                .rejected
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };
        return Err(IngestError::NoValidRows(reason));
    }

    debug!(
        tasks = batch.tasks.len(),
        skipped = batch.skipped,
        rejected = batch.rejected.len(),
        "rows parsed"
    );
    Ok(batch)
}

fn parse_row(row: &Row, row_number: usize, source: &Zone, target: &Zone, now: DateTime<Utc>) -> RowOutcome {
    if is_marked_sent(row) {
        debug!(row = row_number, "row already sent, skipping");
        return RowOutcome::Skipped;
    }

    let to = pick(row, aliases::TO);
    let subject = pick(row, aliases::SUBJECT);
    let body = pick(row, aliases::BODY);

    let missing: Vec<&str> = [("to", &to), ("subject", &subject), ("body", &body)]
        .into_iter()
        .filter_map(|(field, value)| value.is_none().then_some(field))
        .collect();
    let (Some(to), Some(subject), Some(body)) = (to, subject, body) else {
        return RowOutcome::Rejected(RowError {
            row: row_number,
            message: format!("missing required field(s): {}", missing.join(", ")),
        });
    };

    if !is_plausible_address(&to) {
        return RowOutcome::Rejected(RowError {
            row: row_number,
            message: format!("invalid email address: {to}"),
        });
    }

    let send_date = pick(row, aliases::SEND_DATE).unwrap_or_default();
    let send_time = pick(row, aliases::SEND_TIME).unwrap_or_default();
    let raw_delay = pick(row, aliases::DELAY_HOURS).unwrap_or_default();
    let delay = parse_delay_hours(&raw_delay);

    let schedule = if delay > 0.0 && parse_calendar_date(&send_date).is_none() {
        match schedule_after_delay(delay, target, now) {
            Some(schedule) => schedule,
            None => {
                return RowOutcome::Rejected(RowError {
                    row: row_number,
                    message: format!("delay out of range: {raw_delay}"),
                })
            }
        }
    } else {
        compute_schedule(&send_date, &send_time, source, target, now)
    };

    let mut task = RecipientTask::new(&to, &subject, &body, schedule);
    task.name = pick(row, aliases::NAME).unwrap_or_default();
    task.segment = pick(row, aliases::SEGMENT).unwrap_or_default();
    task.phase = pick(row, aliases::PHASE).unwrap_or_default();
    task.weekday = pick(row, aliases::WEEKDAY).unwrap_or_default();
    task.send_date = send_date;
    task.send_time = send_time;
    RowOutcome::Task(Box::new(task))
}

/// First non-empty cell among `labels`, trimmed.
fn pick(row: &Row, labels: &[&str]) -> Option<String> {
    labels.iter().find_map(|label| {
        row.get(label)
            .map(|cell| cell.as_text().trim().to_string())
            .filter(|text| !text.is_empty())
    })
}

fn is_marked_sent(row: &Row) -> bool {
    pick(row, aliases::SENT_MARKER)
        .map(|marker| {
            let marker = marker.to_lowercase();
            aliases::SENT_TOKENS.contains(&marker.as_str())
        })
        .unwrap_or(false)
}
