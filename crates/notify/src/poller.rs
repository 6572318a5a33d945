//! Periodic delivery of due scheduled records, independent of any live job.
//!
//! Each pass: find due records (earliest first, capped), claim each one,
//! send, settle, then fold the outcome back into the stored job. The record
//! is the authority; the job update is best-effort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use mailcast_core::{Config, SenderConfig};
use mailcast_storage::{
    JobStore, Ledger, ScheduledDeliveryRecord, ScheduledStore, Settlement, StoreError, StoreHandle,
};

use crate::deliverability::LookupError;
use crate::delivery::{Courier, Envelope};
use crate::dispatcher::{apply_settlement, pace, DEFAULT_PACING};

pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Counts for one poll pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub found: usize,
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Lost the claim to another dispatcher.
    pub skipped: usize,
    /// Left pending because no complete sender was available.
    pub misconfigured: usize,
}

pub struct Poller {
    scheduled: Arc<dyn ScheduledStore>,
    jobs: Arc<dyn JobStore>,
    ledger: Ledger,
    courier: Courier,
    fallback_sender: SenderConfig,
    batch_size: usize,
    pacing: Duration,
    verify: bool,
    cancel: Arc<AtomicBool>,
}

impl Poller {
    /// `fallback_sender` fills whatever the job's own sender leaves out
    /// (always the password, since jobs are stored without it).
    pub fn new(store: &StoreHandle, courier: Courier, fallback_sender: SenderConfig) -> Self {
        Self {
            scheduled: store.scheduled(),
            jobs: store.jobs(),
            ledger: store.ledger(),
            courier,
            fallback_sender,
            batch_size: DEFAULT_BATCH_SIZE,
            pacing: DEFAULT_PACING,
            verify: false,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wiring used by the worker and `mailcast poll`: SMTP, the configured
    /// sender as fallback, batch size, pacing and verification from `config`.
    pub fn from_config(config: &Config, store: &StoreHandle) -> Result<Self, LookupError> {
        let courier = Courier::from_config(config)?;
        Ok(Self::new(store, courier, config.sender.clone())
            .with_batch_size(config.dispatch.poll_batch_size as usize)
            .with_pacing(config.dispatch.pacing())
            .with_verify(config.dispatch.verify_recipients))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// One pass over the records due at `now`.
    ///
    /// # Errors
    ///
    /// Only the initial due-record query can fail the pass; every later store
    /// error is logged and the pass moves on.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<PollReport, StoreError> {
        let due = self.scheduled.find_due(now, self.batch_size).await?;
        let mut report = PollReport {
            found: due.len(),
            ..PollReport::default()
        };
        if due.is_empty() {
            tracing::debug!("no scheduled deliveries due");
            return Ok(report);
        }
        tracing::info!(due = due.len(), "processing scheduled deliveries");

        let mut last_send: Option<Instant> = None;
        for record in due {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::info!("poll pass cancelled");
                break;
            }

            let sender = self.sender_for(&record).await;
            if let Err(e) = sender.validate() {
                tracing::warn!(record_id = %record.id, job_id = %record.job_id, error = %e, "no usable sender, leaving record pending");
                report.misconfigured += 1;
                continue;
            }

            let envelope = Envelope::from(&record);
            let rejection = if self.verify {
                let verdict = self.courier.verify(&envelope.to).await;
                (!verdict.valid).then(|| verdict.reason.unwrap_or_else(|| "address rejected".to_string()))
            } else {
                None
            };

            if rejection.is_none() {
                if let Some(previous) = last_send {
                    if !pace(previous, self.pacing, &self.cancel).await {
                        tracing::info!("poll pass cancelled");
                        break;
                    }
                }
            }

            match self.scheduled.claim(record.id, now).await {
                Ok(true) => report.claimed += 1,
                Ok(false) => {
                    tracing::debug!(record_id = %record.id, "record claimed elsewhere");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(record_id = %record.id, error = %e, "claim failed");
                    report.skipped += 1;
                    continue;
                }
            }

            let settlement = match rejection {
                Some(reason) => {
                    tracing::warn!(record_id = %record.id, to = %record.to, reason = %reason, "recipient rejected");
                    Settlement::Failed { reason }
                }
                None => {
                    let result = self.courier.send(&sender, &envelope).await;
                    last_send = Some(Instant::now());
                    match result {
                        Ok(()) => Settlement::Sent { at: Utc::now() },
                        Err(e) => {
                            tracing::warn!(record_id = %record.id, to = %record.to, error = %e, "scheduled send failed");
                            Settlement::Failed { reason: e.to_string() }
                        }
                    }
                }
            };

            match &settlement {
                Settlement::Sent { at } => {
                    report.sent += 1;
                    tracing::info!(record_id = %record.id, to = %record.to, "scheduled message sent");
                    self.ledger.record(&record.to, &record.subject, *at).await;
                }
                Settlement::Failed { .. } => report.failed += 1,
            }

            if let Err(e) = self.scheduled.settle(record.id, settlement.clone(), Utc::now()).await {
                tracing::warn!(record_id = %record.id, error = %e, "failed to settle scheduled record");
            }
            self.reconcile(&record, &settlement).await;
        }

        tracing::info!(
            found = report.found,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            misconfigured = report.misconfigured,
            "poll pass complete"
        );
        Ok(report)
    }

    async fn sender_for(&self, record: &ScheduledDeliveryRecord) -> SenderConfig {
        match self.jobs.load(record.job_id).await {
            Ok(job) => job
                .sender
                .map(|s| s.or(&self.fallback_sender))
                .unwrap_or_else(|| self.fallback_sender.clone()),
            Err(e) => {
                tracing::debug!(job_id = %record.job_id, error = %e, "job not loadable, using default sender");
                self.fallback_sender.clone()
            }
        }
    }

    /// Mirror a settled record into its job. The save merges with whatever
    /// a concurrent writer stored meanwhile.
    async fn reconcile(&self, record: &ScheduledDeliveryRecord, settlement: &Settlement) {
        let mut job = match self.jobs.load(record.job_id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(job_id = %record.job_id, error = %e, "job not reconciled");
                return;
            }
        };
        let index = job.task_index_for_record(record.id).unwrap_or(record.task_index);
        if let Err(e) = apply_settlement(&mut job, index, settlement) {
            tracing::debug!(job_id = %job.id, index, error = %e, "job task already settled");
            return;
        }
        job.end_dispatch();
        if let Err(e) = self.jobs.save_merged(&mut job).await {
            tracing::warn!(job_id = %job.id, error = %e, "failed to save reconciled job");
        }
    }
}
