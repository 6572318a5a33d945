//! Downloadable sheets: the blank upload template and per-job exports.

use mailcast_core::{Job, RecipientTask, TaskStatus};
use mailcast_schedule::Zone;

use crate::parser::aliases::CANONICAL_COLUMNS;
use crate::tabular::{Row, Sheet};

pub const TEMPLATE_SHEET: &str = "Recipients";
pub const RESULTS_SHEET: &str = "Results";
pub const FAILURES_SHEET: &str = "Failures";

const SAMPLE_VALUES: &[&str] = &[
    "jane.doe@yourcompany.com",
    "Jane",
    "Hello {{ name }}",
    "<p>Hi {{ name }},</p><p>Thanks for signing up.</p>",
    "trial",
    "1",
    "Monday",
    "2025-06-02",
    "09:00",
    "",
    "",
];

/// One-sheet upload template: every recognised column with a sample row.
pub fn template_sheet() -> Sheet {
    let sample: Row = CANONICAL_COLUMNS
        .iter()
        .zip(SAMPLE_VALUES)
        .map(|(column, value)| (*column, *value))
        .collect();
    Sheet::new(TEMPLATE_SHEET, vec![sample])
}

/// Export of a job: every task on "Results", failed ones again on "Failures".
pub fn results_sheets(job: &Job, display_zone: &Zone) -> Vec<Sheet> {
    let results = job.tasks.iter().map(|t| result_row(t, display_zone)).collect();
    let failures = job
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .map(|t| result_row(t, display_zone))
        .collect();
    vec![
        Sheet::new(RESULTS_SHEET, results),
        Sheet::new(FAILURES_SHEET, failures),
    ]
}

fn result_row(task: &RecipientTask, zone: &Zone) -> Row {
    Row::new()
        .with("to", task.to.as_str())
        .with("name", task.name.as_str())
        .with("segment", task.segment.as_str())
        .with("phase", task.phase.as_str())
        .with("subject", task.subject.as_str())
        .with("scheduledFor", task.display_time.as_str())
        .with("status", task.status.to_string())
        .with(
            "sentAt",
            task.sent_at.map(|at| zone.display(at)).unwrap_or_default(),
        )
        .with("error", task.error.clone().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use mailcast_schedule::Schedule;

    use super::*;
    use crate::tabular::{CellValue, JsonTabular, TabularReader};
    use crate::parse_rows;

    #[test]
    fn template_parses_back_into_a_task() {
        let sheet = template_sheet();
        assert_eq!(sheet.rows[0].len(), CANONICAL_COLUMNS.len());

        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let batch = parse_rows(&sheet.rows, &Zone::utc(), &Zone::utc(), now).unwrap();
        assert_eq!(batch.tasks.len(), 1);
        assert_eq!(batch.tasks[0].segment, "trial");
    }

    #[test]
    fn export_splits_failures() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let zone: Zone = "+08:00".parse().unwrap();
        let tasks = ["a@x.io", "b@x.io", "c@x.io"]
            .iter()
            .map(|to| RecipientTask::new(to, "s", "b", Schedule::immediate(&zone, now)))
            .collect();
        let mut job = Job::new(tasks, None, now);
        job.mark_sent(0, now).unwrap();
        job.mark_failed(1, "mailbox full").unwrap();

        let sheets = results_sheets(&job, &zone);
        assert_eq!(sheets[0].name, RESULTS_SHEET);
        assert_eq!(sheets[0].rows.len(), 3);
        assert_eq!(
            sheets[0].rows[0].get("sentAt"),
            Some(&CellValue::Text("2025-06-01 08:00".into()))
        );
        assert_eq!(sheets[1].name, FAILURES_SHEET);
        assert_eq!(sheets[1].rows.len(), 1);
        assert_eq!(
            sheets[1].rows[0].get("error"),
            Some(&CellValue::Text("mailbox full".into()))
        );
    }

    #[test]
    fn export_is_readable_as_upload() {
        use crate::tabular::TabularWriter;

        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let task = RecipientTask::new("a@x.io", "s", "b", Schedule::immediate(&Zone::utc(), now));
        let job = Job::new(vec![task], None, now);
        let bytes = JsonTabular.render(&results_sheets(&job, &Zone::utc())).unwrap();
        let rows = JsonTabular.parse_rows(&bytes).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("status"), Some(&CellValue::Text("pending".into())));
    }
}
