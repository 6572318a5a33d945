//! Sends a job's selected tasks, one at a time, with pacing between sends.
//!
//! Each task's outcome is independent: a failed send never stops the pass.
//! The only fatal condition is a sender that cannot send at all, and that is
//! reported before the first task is touched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;

use mailcast_core::{Job, JobResult, LifecycleError, Selection, SenderConfig, TaskStatus};
use mailcast_storage::{Ledger, ScheduledStore, SendEntry, Settlement};

use crate::delivery::{Courier, Envelope};

/// Default wait between two sends.
pub const DEFAULT_PACING: Duration = Duration::from_millis(2000);

/// Longest single sleep while pacing, so cancellation is noticed promptly.
const PACING_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Knobs for one dispatch pass.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub selection: Selection,
    pub pacing: Duration,
    /// Run the deliverability check before each send.
    pub verify: bool,
    /// Set from outside to stop issuing sends after the in-flight one.
    pub cancel: Arc<AtomicBool>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            selection: Selection::all(),
            pacing: DEFAULT_PACING,
            verify: true,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// What happened to one attempted task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub index: usize,
    pub to: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-task outcomes plus the job's recomputed tally.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    /// Tasks whose durable record another dispatcher had already claimed.
    pub skipped_claimed: usize,
    pub cancelled: bool,
    pub outcomes: Vec<TaskOutcome>,
    pub result: JobResult,
}

pub struct Dispatcher {
    courier: Courier,
    ledger: Ledger,
    scheduled: Option<Arc<dyn ScheduledStore>>,
}

impl Dispatcher {
    pub fn new(courier: Courier, ledger: Ledger) -> Self {
        Self {
            courier,
            ledger,
            scheduled: None,
        }
    }

    /// Claim and settle durable records for tasks that have one.
    pub fn with_scheduled_store(mut self, store: Arc<dyn ScheduledStore>) -> Self {
        self.scheduled = Some(store);
        self
    }

    /// Run one pass over `job`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `sender` is incomplete. Nothing is
    /// attempted in that case.
    pub async fn run(
        &self,
        job: &mut Job,
        sender: &SenderConfig,
        options: &DispatchOptions,
    ) -> Result<DispatchReport, DispatchError> {
        sender
            .validate()
            .map_err(|e| DispatchError::Config(e.to_string()))?;

        let selected = job.dispatchable(&options.selection, Utc::now());
        let mut report = DispatchReport::default();
        if selected.is_empty() {
            tracing::debug!(job_id = %job.id, "no tasks due for dispatch");
            report.result = job.tally();
            return Ok(report);
        }

        tracing::info!(
            job_id = %job.id,
            selected = selected.len(),
            channel = self.courier.channel_name(),
            "dispatch started"
        );
        job.begin_dispatch();

        let mut sent_entries = Vec::new();
        let mut last_send: Option<Instant> = None;

        for index in selected {
            if options.cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                break;
            }

            let task = &job.tasks[index];
            let envelope = Envelope::from(task);
            let record_id = task.record_id;

            // Claim last so a cancelled pass never strands a claimed record.
            let rejection = if options.verify {
                let verdict = self.courier.verify(&envelope.to).await;
                (!verdict.valid).then(|| verdict.reason.unwrap_or_else(|| "address rejected".to_string()))
            } else {
                None
            };

            if rejection.is_none() {
                if let Some(previous) = last_send {
                    if !pace(previous, options.pacing, &options.cancel).await {
                        report.cancelled = true;
                        break;
                    }
                }
            }

            if let Some(id) = record_id {
                if !self.claim(id).await {
                    report.skipped_claimed += 1;
                    self.mirror_settled(job, index, id).await;
                    continue;
                }
            }

            report.attempted += 1;

            if let Some(reason) = rejection {
                tracing::warn!(job_id = %job.id, to = %envelope.to, reason = %reason, "recipient rejected");
                self.fail(job, index, &envelope, reason, &mut report);
                self.settle(record_id, failed_settlement(job, index)).await;
                continue;
            }

            let started = std::time::Instant::now();
            let result = self.courier.send(sender, &envelope).await;
            last_send = Some(Instant::now());
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    let at = Utc::now();
                    tracing::info!(job_id = %job.id, to = %envelope.to, duration_ms, "message sent");
                    if let Err(e) = job.mark_sent(index, at) {
                        tracing::warn!(job_id = %job.id, error = %e, "task already settled");
                    }
                    report.sent += 1;
                    report.outcomes.push(TaskOutcome {
                        index,
                        to: envelope.to.clone(),
                        status: TaskStatus::Sent,
                        error: None,
                    });
                    sent_entries.push(SendEntry {
                        address: envelope.to.clone(),
                        subject: envelope.subject.clone(),
                        at,
                    });
                    self.settle(record_id, Settlement::Sent { at }).await;
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, to = %envelope.to, error = %e, duration_ms, "send failed");
                    self.fail(job, index, &envelope, e.to_string(), &mut report);
                    self.settle(record_id, failed_settlement(job, index)).await;
                }
            }
        }

        job.end_dispatch();
        self.ledger.record_batch(&sent_entries).await;

        report.result = job.tally();
        tracing::info!(
            job_id = %job.id,
            status = %job.status(),
            sent = report.sent,
            failed = report.failed,
            pending = report.result.pending,
            cancelled = report.cancelled,
            "dispatch complete"
        );
        Ok(report)
    }

    fn fail(&self, job: &mut Job, index: usize, envelope: &Envelope, reason: String, report: &mut DispatchReport) {
        if let Err(e) = job.mark_failed(index, reason.clone()) {
            tracing::warn!(job_id = %job.id, error = %e, "task already settled");
        }
        report.failed += 1;
        report.outcomes.push(TaskOutcome {
            index,
            to: envelope.to.clone(),
            status: TaskStatus::Failed,
            error: Some(reason),
        });
    }

    /// Without a store, or when the store errors, the job alone decides.
    async fn claim(&self, id: uuid::Uuid) -> bool {
        let Some(store) = &self.scheduled else {
            return true;
        };
        match store.claim(id, Utc::now()).await {
            Ok(won) => won,
            Err(e) => {
                tracing::warn!(record_id = %id, error = %e, "claim failed, dispatching from job state");
                true
            }
        }
    }

    /// After a lost claim, copy the record's outcome into the job if whoever
    /// holds it has already settled it.
    async fn mirror_settled(&self, job: &mut Job, index: usize, id: uuid::Uuid) {
        let Some(store) = &self.scheduled else {
            return;
        };
        let record = match store.get(id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(record_id = %id, error = %e, "claimed record not readable");
                return;
            }
        };
        let Some(settlement) = record.settlement() else {
            tracing::debug!(job_id = %job.id, to = %record.to, "record claimed elsewhere, skipping");
            return;
        };
        tracing::debug!(job_id = %job.id, to = %record.to, status = %record.status, "record settled elsewhere");
        if let Err(e) = apply_settlement(job, index, &settlement) {
            tracing::debug!(job_id = %job.id, error = %e, "task already settled");
        }
    }

    async fn settle(&self, record_id: Option<uuid::Uuid>, outcome: Settlement) {
        let (Some(store), Some(id)) = (&self.scheduled, record_id) else {
            return;
        };
        if let Err(e) = store.settle(id, outcome, Utc::now()).await {
            tracing::warn!(record_id = %id, error = %e, "failed to settle scheduled record");
        }
    }
}

/// Record a durable outcome on the job's task.
pub(crate) fn apply_settlement(job: &mut Job, index: usize, settlement: &Settlement) -> Result<(), LifecycleError> {
    match settlement {
        Settlement::Sent { at } => job.mark_sent(index, *at),
        Settlement::Failed { reason } => job.mark_failed(index, reason.clone()),
    }
}

fn failed_settlement(job: &Job, index: usize) -> Settlement {
    Settlement::Failed {
        reason: job.tasks[index].error.clone().unwrap_or_default(),
    }
}

/// Wait until `pacing` has passed since `previous`. False if cancelled.
pub(crate) async fn pace(previous: Instant, pacing: Duration, cancel: &AtomicBool) -> bool {
    let deadline = previous + pacing;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(PACING_TICK)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};

    use mailcast_core::{JobStatus, RecipientTask};
    use mailcast_schedule::{Schedule, Zone};
    use mailcast_storage::{DeliveryStatus, ScheduledDeliveryRecord, StoreHandle};

    use super::*;
    use crate::deliverability::{DeliverabilityChecker, Verdict};
    use crate::traits::{MailError, Mailer, OutgoingMail};

    struct MockMailer {
        send_count: Arc<AtomicUsize>,
        fail_for: Option<String>,
    }

    impl MockMailer {
        fn ok(count: &Arc<AtomicUsize>) -> Arc<Self> {
            Arc::new(Self { send_count: count.clone(), fail_for: None })
        }
    }

    #[async_trait]
    impl Mailer for MockMailer {
        async fn send(&self, _sender: &SenderConfig, mail: &OutgoingMail) -> Result<(), MailError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            match &self.fail_for {
                Some(addr) if *addr == mail.to => Err(MailError::Smtp("550 mailbox unavailable".into())),
                _ => Ok(()),
            }
        }
        fn channel_name(&self) -> &str {
            "mock"
        }
    }

    struct DenyDomain(&'static str);

    #[async_trait]
    impl DeliverabilityChecker for DenyDomain {
        async fn check(&self, address: &str) -> Verdict {
            if address.ends_with(self.0) {
                Verdict::invalid("domain has no mail server")
            } else {
                Verdict::valid()
            }
        }
    }

    fn sender() -> SenderConfig {
        SenderConfig {
            smtp_host: Some("smtp.mail.io".into()),
            smtp_port: 587,
            tls: true,
            username: Some("bot".into()),
            password: Some("pw".into()),
            from_address: Some("news@mail.io".into()),
            from_name: Some("News".into()),
        }
    }

    fn task(to: &str, hours_from_now: i64) -> RecipientTask {
        let at = Utc::now() + ChronoDuration::hours(hours_from_now);
        let schedule = Schedule {
            scheduled_for: at,
            display: Zone::utc().display(at),
            delay_hours: hours_from_now.max(0) as f64,
        };
        RecipientTask::new(to, "Hello {{ name }}", "Body", schedule)
    }

    fn options() -> DispatchOptions {
        DispatchOptions {
            pacing: Duration::ZERO,
            verify: false,
            ..DispatchOptions::default()
        }
    }

    fn dispatcher(mailer: Arc<dyn Mailer>, store: &StoreHandle) -> Dispatcher {
        Dispatcher::new(Courier::new(mailer), store.ledger())
    }

    #[tokio::test]
    async fn sends_every_due_task_and_records_history() {
        let count = Arc::new(AtomicUsize::new(0));
        let store = StoreHandle::memory();
        let mut job = Job::new(vec![task("a@mail.io", -1), task("b@mail.io", 0)], None, Utc::now());

        let report = dispatcher(MockMailer::ok(&count), &store)
            .run(&mut job, &sender(), &options())
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(report.sent, 2);
        assert_eq!(report.result.success, 2);
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.tasks.iter().all(|t| t.sent_at.is_some()));

        let counts = store.ledger().counts_for(&["a@mail.io", "b@mail.io"]).await;
        assert_eq!(counts.get("a@mail.io"), Some(&1));
        assert_eq!(counts.get("b@mail.io"), Some(&1));
    }

    #[tokio::test]
    async fn incomplete_sender_is_fatal_before_any_attempt() {
        let count = Arc::new(AtomicUsize::new(0));
        let store = StoreHandle::memory();
        let mut job = Job::new(vec![task("a@mail.io", 0)], None, Utc::now());
        let sender = SenderConfig { password: None, ..sender() };

        let err = dispatcher(MockMailer::ok(&count), &store)
            .run(&mut job, &sender, &options())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("SMTP_PASSWORD"), "got: {err}");
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[tokio::test]
    async fn partial_failure_doesnt_block() {
        let count = Arc::new(AtomicUsize::new(0));
        let store = StoreHandle::memory();
        let mailer = Arc::new(MockMailer {
            send_count: count.clone(),
            fail_for: Some("a@mail.io".into()),
        });
        let mut job = Job::new(vec![task("a@mail.io", 0), task("b@mail.io", 0)], None, Utc::now());

        let report = dispatcher(mailer, &store).run(&mut job, &sender(), &options()).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(report.outcomes[0].error.as_deref(), Some("SMTP delivery failed: 550 mailbox unavailable"));
        assert_eq!(job.tasks[0].status, TaskStatus::Failed);
        assert_eq!(job.tasks[1].status, TaskStatus::Sent);
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(store.ledger().counts_for(&["a@mail.io"]).await.is_empty());
    }

    #[tokio::test]
    async fn rejected_recipient_fails_without_sending() {
        let count = Arc::new(AtomicUsize::new(0));
        let store = StoreHandle::memory();
        let courier = Courier::new(MockMailer::ok(&count)).with_checker(Arc::new(DenyDomain("@dead.io")));
        let mut job = Job::new(vec![task("x@dead.io", 0), task("y@mail.io", 0)], None, Utc::now());

        let opts = DispatchOptions { verify: true, ..options() };
        let report = Dispatcher::new(courier, store.ledger())
            .run(&mut job, &sender(), &opts)
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(job.tasks[0].status, TaskStatus::Failed);
        assert_eq!(job.tasks[0].error.as_deref(), Some("domain has no mail server"));
        assert_eq!(report.result, JobResult { total: 2, success: 1, failed: 1, pending: 0 });
    }

    #[tokio::test]
    async fn future_tasks_wait_unless_forced() {
        let count = Arc::new(AtomicUsize::new(0));
        let store = StoreHandle::memory();
        let mut job = Job::new(vec![task("later@mail.io", 48)], None, Utc::now());
        let d = dispatcher(MockMailer::ok(&count), &store);

        let report = d.run(&mut job, &sender(), &options()).await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(job.tasks[0].status, TaskStatus::Pending);
        assert_eq!(job.status(), JobStatus::Pending);

        let forced = DispatchOptions {
            selection: Selection::all().with_force_all(true),
            ..options()
        };
        let report = d.run(&mut job, &sender(), &forced).await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn only_selected_addresses_are_sent() {
        let count = Arc::new(AtomicUsize::new(0));
        let store = StoreHandle::memory();
        let mut job = Job::new(vec![task("a@mail.io", 0), task("b@mail.io", 0)], None, Utc::now());

        let opts = DispatchOptions {
            selection: Selection::only(["B@Mail.io"]),
            ..options()
        };
        dispatcher(MockMailer::ok(&count), &store).run(&mut job, &sender(), &opts).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(job.tasks[0].status, TaskStatus::Pending);
        assert_eq!(job.tasks[1].status, TaskStatus::Sent);
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_applies_between_sends_only() {
        let count = Arc::new(AtomicUsize::new(0));
        let store = StoreHandle::memory();
        let mut job = Job::new(
            vec![task("a@mail.io", 0), task("b@mail.io", 0), task("c@mail.io", 0)],
            None,
            Utc::now(),
        );
        let opts = DispatchOptions { pacing: DEFAULT_PACING, ..options() };

        let started = Instant::now();
        dispatcher(MockMailer::ok(&count), &store).run(&mut job, &sender(), &opts).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_millis(4000), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(5000), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let store = StoreHandle::memory();
        let mut job = Job::new(vec![task("a@mail.io", 0), task("b@mail.io", 0)], None, Utc::now());
        let opts = options();
        opts.cancel.store(true, Ordering::SeqCst);

        let report = dispatcher(MockMailer::ok(&count), &store).run(&mut job, &sender(), &opts).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(report.result.pending, 2);
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[tokio::test]
    async fn claimed_records_are_not_sent_twice() {
        let count = Arc::new(AtomicUsize::new(0));
        let store = StoreHandle::memory();
        let mut job = Job::new(vec![task("a@mail.io", 2), task("b@mail.io", 2)], None, Utc::now());
        assert_eq!(store.submit_job(&mut job, Utc::now()).await.unwrap(), 2);

        let taken = job.tasks[0].record_id.unwrap();
        assert!(store.scheduled().claim(taken, Utc::now()).await.unwrap());

        let forced = DispatchOptions {
            selection: Selection::all().with_force_all(true),
            ..options()
        };
        let report = dispatcher(MockMailer::ok(&count), &store)
            .with_scheduled_store(store.scheduled())
            .run(&mut job, &sender(), &forced)
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(report.skipped_claimed, 1);
        assert_eq!(job.tasks[0].status, TaskStatus::Pending);

        let settled: ScheduledDeliveryRecord = store.scheduled().get(job.tasks[1].record_id.unwrap()).await.unwrap();
        assert_eq!(settled.status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn lost_claim_takes_the_settled_outcome() {
        let count = Arc::new(AtomicUsize::new(0));
        let store = StoreHandle::memory();
        let mut job = Job::new(vec![task("a@mail.io", 2), task("b@mail.io", 2)], None, Utc::now());
        store.submit_job(&mut job, Utc::now()).await.unwrap();

        let sent_elsewhere = job.tasks[0].record_id.unwrap();
        let failed_elsewhere = job.tasks[1].record_id.unwrap();
        let at = Utc::now();
        for (id, outcome) in [
            (sent_elsewhere, Settlement::Sent { at }),
            (failed_elsewhere, Settlement::Failed { reason: "bounced".into() }),
        ] {
            assert!(store.scheduled().claim(id, at).await.unwrap());
            store.scheduled().settle(id, outcome, at).await.unwrap();
        }

        let forced = DispatchOptions {
            selection: Selection::all().with_force_all(true),
            ..options()
        };
        let report = dispatcher(MockMailer::ok(&count), &store)
            .with_scheduled_store(store.scheduled())
            .run(&mut job, &sender(), &forced)
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(report.skipped_claimed, 2);
        assert_eq!(report.attempted, 0);
        assert_eq!(job.tasks[0].status, TaskStatus::Sent);
        assert_eq!(job.tasks[0].sent_at, Some(at));
        assert_eq!(job.tasks[1].status, TaskStatus::Failed);
        assert_eq!(job.tasks[1].error.as_deref(), Some("bounced"));
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(report.result.pending, 0);
    }
}
