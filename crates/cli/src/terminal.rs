use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};

use mailcast_core::{RecipientTask, TaskStatus};
use mailcast_ingest::RowError;
use mailcast_notify::{DispatchReport, PollReport};
use mailcast_storage::{HistoryRecord, OversendReport};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const HEADER: Color = Color::Magenta;
    const SENT: Color = Color::Green;
    const PENDING: Color = Color::Cyan;
    const WARNING: Color = Color::Yellow;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
}

/// Colored report output on stdout.
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    fn line(&self, color: Color, text: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, SetForegroundColor(color), Print(text), Print("\n"), ResetColor)?;
        stdout.flush()?;
        Ok(())
    }

    pub fn print_header(&self, msg: &str) -> Result<()> {
        self.line(Colors::HEADER, msg)
    }

    pub fn print_info(&self, msg: &str) -> Result<()> {
        self.line(Colors::DIM, msg)
    }

    pub fn print_warning(&self, msg: &str) -> Result<()> {
        self.line(Colors::WARNING, &format!("Warning: {msg}"))
    }

    /// One line per task: status, address, schedule, delay.
    pub fn print_tasks(&self, tasks: &[RecipientTask]) -> Result<()> {
        self.print_header(&format!("{} task(s)", tasks.len()))?;
        for task in tasks {
            let color = status_color(task.status);
            let mut text = format!(
                "  {:<8} {:<32} {}  (+{:.2}h)",
                task.status.to_string(),
                task.to,
                task.display_time,
                task.delay_hours
            );
            if let Some(error) = &task.error {
                text.push_str(&format!("  {error}"));
            }
            self.line(color, &text)?;
        }
        Ok(())
    }

    pub fn print_rejected(&self, rejected: &[RowError], skipped: usize) -> Result<()> {
        if skipped > 0 {
            self.print_info(&format!("{skipped} row(s) already marked as sent, skipped"))?;
        }
        for err in rejected {
            self.print_warning(&err.to_string())?;
        }
        Ok(())
    }

    pub fn print_oversend(&self, report: &OversendReport, threshold: u32) -> Result<()> {
        for dup in &report.batch_duplicates {
            self.print_warning(&format!(
                "{} appears {} times in this upload (limit {threshold})",
                dup.address, dup.occurrences
            ))?;
        }
        for record in &report.over_limit {
            self.print_warning(&format!(
                "{} has already been sent {} message(s) (limit {threshold})",
                record.address, record.sent_count
            ))?;
        }
        Ok(())
    }

    pub fn print_dispatch(&self, report: &DispatchReport) -> Result<()> {
        for outcome in &report.outcomes {
            let mut text = format!("  {:<8} {}", outcome.status.to_string(), outcome.to);
            if let Some(error) = &outcome.error {
                text.push_str(&format!("  {error}"));
            }
            self.line(status_color(outcome.status), &text)?;
        }
        if report.skipped_claimed > 0 {
            self.print_info(&format!("{} task(s) already being sent elsewhere", report.skipped_claimed))?;
        }
        if report.cancelled {
            self.print_warning("dispatch cancelled; remaining tasks stay pending")?;
        }
        let r = report.result;
        self.print_header(&format!(
            "total {}  sent {}  failed {}  pending {}",
            r.total, r.success, r.failed, r.pending
        ))
    }

    pub fn print_poll(&self, report: &PollReport) -> Result<()> {
        self.print_header(&format!(
            "due {}  sent {}  failed {}  skipped {}  misconfigured {}",
            report.found, report.sent, report.failed, report.skipped, report.misconfigured
        ))
    }

    pub fn print_history(&self, records: &[HistoryRecord], unknown: &[String]) -> Result<()> {
        for record in records {
            self.line(
                Colors::SENT,
                &format!(
                    "  {:<32} sent {:>3}x  last {}",
                    record.address,
                    record.sent_count,
                    record.last_sent_at.format("%Y-%m-%d %H:%M UTC")
                ),
            )?;
            for subject in &record.recent_subjects {
                self.print_info(&format!("      {subject}"))?;
            }
        }
        for address in unknown {
            self.print_info(&format!("  {address:<32} never sent"))?;
        }
        Ok(())
    }
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Sent => Colors::SENT,
        TaskStatus::Pending => Colors::PENDING,
        TaskStatus::Failed => Colors::ERROR,
    }
}
