//! Job (batch) lifecycle: status derivation, dispatch selection, tallies.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SenderConfig;
use crate::error::LifecycleError;
use crate::task::{normalize_address, RecipientTask, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Nothing dispatched yet, or waiting for deferred tasks to come due.
    Pending,
    /// A dispatch pass is running.
    Processing,
    /// Every task settled, none failed.
    Completed,
    /// Every task settled, at least one failed.
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Aggregate outcome counts, always recomputed from the task list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Which pending tasks a dispatch pass may touch.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Normalized addresses to include; `None` means every task.
    only: Option<HashSet<String>>,
    /// Ignore `scheduled_for` and send everything selected now.
    pub force_all: bool,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            only: Some(
                addresses
                    .into_iter()
                    .map(|a| normalize_address(a.as_ref()))
                    .collect(),
            ),
            force_all: false,
        }
    }

    pub fn with_force_all(mut self, force_all: bool) -> Self {
        self.force_all = force_all;
        self
    }

    /// Drop addresses from the inclusion set (or from "all" by building an
    /// explicit set from `universe`).
    pub fn excluding<'a>(mut self, excluded: &HashSet<String>, universe: impl Iterator<Item = &'a str>) -> Self {
        if excluded.is_empty() {
            return self;
        }
        let base: HashSet<String> = match self.only.take() {
            Some(set) => set,
            None => universe.map(normalize_address).collect(),
        };
        self.only = Some(base.into_iter().filter(|a| !excluded.contains(a)).collect());
        self
    }

    pub fn includes(&self, address: &str) -> bool {
        self.only
            .as_ref()
            .map_or(true, |set| set.contains(&normalize_address(address)))
    }

    /// The selection predicate, evaluated fresh against `now`.
    pub fn admits(&self, task: &RecipientTask, now: DateTime<Utc>) -> bool {
        task.status == TaskStatus::Pending
            && self.includes(&task.to)
            && (self.force_all || task.is_due(now))
    }
}

/// A batch of recipient tasks created from one upload. Sole owner of its tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<RecipientTask>,
    status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<JobResult>,
}

impl Job {
    pub fn new(tasks: Vec<RecipientTask>, sender: Option<SenderConfig>, now: DateTime<Utc>) -> Self {
        let mut job = Self {
            id: Uuid::new_v4(),
            created_at: now,
            tasks,
            status: JobStatus::Pending,
            sender,
            result: None,
        };
        job.refresh_status();
        job
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Aggregate counts as of the last transition.
    pub fn result(&self) -> JobResult {
        self.result.unwrap_or_else(|| self.tally())
    }

    /// Indices of tasks the selection admits right now, in task order.
    pub fn dispatchable(&self, selection: &Selection, now: DateTime<Utc>) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| selection.admits(t, now))
            .map(|(i, _)| i)
            .collect()
    }

    /// Enter `Processing` for the duration of a dispatch pass.
    pub fn begin_dispatch(&mut self) {
        if !self.is_settled() {
            self.status = JobStatus::Processing;
        }
    }

    /// Leave `Processing`; unsettled jobs go back to `Pending` until their
    /// deferred tasks come due.
    pub fn end_dispatch(&mut self) {
        if self.status == JobStatus::Processing {
            self.status = JobStatus::Pending;
        }
        self.refresh_status();
    }

    pub fn mark_sent(&mut self, index: usize, at: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.task_mut(index)?.mark_sent(at)?;
        self.refresh_status();
        Ok(())
    }

    pub fn mark_failed(&mut self, index: usize, reason: impl Into<String>) -> Result<(), LifecycleError> {
        self.task_mut(index)?.mark_failed(reason)?;
        self.refresh_status();
        Ok(())
    }

    /// Pure recomputation over the task list.
    pub fn tally(&self) -> JobResult {
        self.tasks.iter().fold(
            JobResult {
                total: self.tasks.len(),
                ..JobResult::default()
            },
            |mut acc, t| {
                match t.status {
                    TaskStatus::Pending => acc.pending += 1,
                    TaskStatus::Sent => acc.success += 1,
                    TaskStatus::Failed => acc.failed += 1,
                }
                acc
            },
        )
    }

    /// True once no task is pending.
    pub fn is_settled(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    /// Take over the outcome of every task that `other` (a copy of this job
    /// written elsewhere) has settled and this one still holds as pending.
    /// Copies of a different job, or of a different task list, are ignored.
    pub fn absorb(&mut self, other: &Job) {
        if other.id != self.id || other.tasks.len() != self.tasks.len() {
            return;
        }
        for (mine, theirs) in self.tasks.iter_mut().zip(&other.tasks) {
            if mine.status == TaskStatus::Pending && theirs.status.is_terminal() {
                *mine = theirs.clone();
            }
        }
        self.refresh_status();
    }

    pub fn task_index_for_record(&self, record_id: Uuid) -> Option<usize> {
        self.tasks.iter().position(|t| t.record_id == Some(record_id))
    }

    fn task_mut(&mut self, index: usize) -> Result<&mut RecipientTask, LifecycleError> {
        self.tasks.get_mut(index).ok_or(LifecycleError::NoSuchTask(index))
    }

    /// Re-derive `status` and `result` from the tasks.
    fn refresh_status(&mut self) {
        let tally = self.tally();
        self.result = Some(tally);
        if tally.pending == 0 && tally.total > 0 {
            self.status = if tally.failed > 0 {
                JobStatus::Failed
            } else {
                JobStatus::Completed
            };
        }
    }
}
