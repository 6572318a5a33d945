use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use mailcast_core::{normalize_address, Config, Job, Selection, SenderConfig};
use mailcast_ingest::{
    parse_rows, results_sheets, template_sheet, JsonTabular, ParsedBatch, TabularReader, TabularWriter,
};
use mailcast_notify::{Courier, DispatchOptions, DispatchReport, Dispatcher, Poller};
use mailcast_storage::StoreHandle;

use crate::cli::Command;
use crate::terminal::Terminal;

pub struct App {
    config: Config,
    store: StoreHandle,
    terminal: Terminal,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let store = StoreHandle::from_config(&config.storage)
            .await
            .context("failed to open store")?;
        Ok(Self {
            config,
            store,
            terminal: Terminal::new(),
        })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Preview { file } => self.preview(&file).await,
            Command::Send {
                file,
                only,
                force_all,
                skip_oversent,
                no_verify,
            } => self.send(&file, &only, force_all, skip_oversent, !no_verify).await,
            Command::Dispatch {
                job_id,
                force_all,
                only,
                no_verify,
            } => self.dispatch(job_id, &only, force_all, !no_verify).await,
            Command::History { addresses } => self.history(&addresses).await,
            Command::Template { out } => self.template(&out).await,
            Command::Export { job_id, out } => self.export(job_id, &out).await,
            Command::Poll { once } => self.poll(once).await,
        }
    }

    async fn read_batch(&self, file: &Path, now: DateTime<Utc>) -> Result<ParsedBatch> {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?;
        let rows = JsonTabular.parse_rows(&bytes)?;
        let schedule = &self.config.schedule;
        let batch = parse_rows(&rows, &schedule.source, &schedule.target, now)
            .with_context(|| format!("nothing to send in {}", file.display()))?;
        Ok(batch)
    }

    async fn preview(&self, file: &Path) -> Result<()> {
        let batch = self.read_batch(file, Utc::now()).await?;
        self.terminal.print_tasks(&batch.tasks)?;
        self.terminal.print_rejected(&batch.rejected, batch.skipped)?;

        let addresses: Vec<&str> = batch.tasks.iter().map(|t| t.to.as_str()).collect();
        let threshold = self.config.dispatch.oversend_threshold;
        let report = self.store.ledger().oversend_report(&addresses, threshold).await;
        self.terminal.print_oversend(&report, threshold)
    }

    async fn send(
        &self,
        file: &Path,
        only: &[String],
        force_all: bool,
        skip_oversent: bool,
        verify: bool,
    ) -> Result<()> {
        let now = Utc::now();
        let batch = self.read_batch(file, now).await?;
        self.terminal.print_rejected(&batch.rejected, batch.skipped)?;
        self.config.sender.validate().context("cannot send")?;

        let threshold = self.config.dispatch.oversend_threshold;
        let mut selection = selection_for(only, force_all);
        {
            let addresses: Vec<&str> = batch.tasks.iter().map(|t| t.to.as_str()).collect();
            let report = self.store.ledger().oversend_report(&addresses, threshold).await;
            self.terminal.print_oversend(&report, threshold)?;
            if skip_oversent && !report.over_limit.is_empty() {
                let excluded: HashSet<String> = report.over_limit.iter().map(|r| r.address.clone()).collect();
                self.terminal
                    .print_info(&format!("leaving out {} over-sent address(es)", excluded.len()))?;
                selection = selection.excluding(&excluded, addresses.iter().copied());
            }
        }

        let mut job = Job::new(batch.tasks, Some(self.config.sender.clone()), now);
        let deferred = self
            .store
            .submit_job(&mut job, now)
            .await
            .context("failed to store job")?;
        self.terminal.print_info(&format!(
            "job {} stored: {} task(s), {deferred} scheduled for later",
            job.id,
            job.tasks.len()
        ))?;

        let sender = self.config.sender.clone();
        self.dispatch_job(&mut job, &sender, selection, verify).await?;
        Ok(())
    }

    async fn dispatch(&self, job_id: Uuid, only: &[String], force_all: bool, verify: bool) -> Result<()> {
        let mut job = self
            .store
            .jobs()
            .load(job_id)
            .await
            .with_context(|| format!("failed to load job {job_id}"))?;
        let sender = job
            .sender
            .clone()
            .map(|s| s.or(&self.config.sender))
            .unwrap_or_else(|| self.config.sender.clone());
        self.dispatch_job(&mut job, &sender, selection_for(only, force_all), verify)
            .await?;
        Ok(())
    }

    async fn dispatch_job(
        &self,
        job: &mut Job,
        sender: &SenderConfig,
        selection: Selection,
        verify: bool,
    ) -> Result<DispatchReport> {
        let verify = verify && self.config.dispatch.verify_recipients;
        let courier = Courier::from_config(&self.config).context("failed to build DNS resolver")?;
        let dispatcher = Dispatcher::new(courier, self.store.ledger()).with_scheduled_store(self.store.scheduled());

        let cancel = Arc::new(AtomicBool::new(false));
        watch_ctrl_c(cancel.clone());
        let options = DispatchOptions {
            selection,
            pacing: self.config.dispatch.pacing(),
            verify,
            cancel,
        };

        let report = dispatcher.run(job, sender, &options).await?;
        self.store
            .jobs()
            .save_merged(job)
            .await
            .with_context(|| format!("failed to save job {}", job.id))?;
        self.terminal.print_dispatch(&report)?;
        self.terminal.print_info(&format!("job {} is {}", job.id, job.status()))?;
        Ok(report)
    }

    async fn history(&self, addresses: &[String]) -> Result<()> {
        let mut seen = HashSet::new();
        let keys: Vec<String> = addresses
            .iter()
            .map(|a| normalize_address(a))
            .filter(|k| seen.insert(k.clone()))
            .collect();
        let records = self.store.history().get_many(&keys).await?;
        let unknown: Vec<String> = keys
            .into_iter()
            .filter(|k| !records.iter().any(|r| &r.address == k))
            .collect();
        self.terminal.print_history(&records, &unknown)
    }

    async fn template(&self, out: &Path) -> Result<()> {
        let bytes = JsonTabular.render(&[template_sheet()])?;
        tokio::fs::write(out, bytes)
            .await
            .with_context(|| format!("failed to write {}", out.display()))?;
        self.terminal.print_info(&format!("template written to {}", out.display()))
    }

    async fn export(&self, job_id: Uuid, out: &Path) -> Result<()> {
        let job = self
            .store
            .jobs()
            .load(job_id)
            .await
            .with_context(|| format!("failed to load job {job_id}"))?;
        let bytes = JsonTabular.render(&results_sheets(&job, &self.config.schedule.target))?;
        tokio::fs::write(out, bytes)
            .await
            .with_context(|| format!("failed to write {}", out.display()))?;
        let tally = job.tally();
        self.terminal.print_info(&format!(
            "{} result row(s), {} failure(s) written to {}",
            tally.total,
            tally.failed,
            out.display()
        ))
    }

    async fn poll(&self, once: bool) -> Result<()> {
        if !self.store.is_durable() {
            self.terminal
                .print_warning("in-memory store: only records from this process are visible")?;
        }
        let poller = Poller::from_config(&self.config, &self.store).context("failed to build DNS resolver")?;
        let cancel = poller.cancel_flag();
        let shutdown = watch_ctrl_c(cancel.clone());
        let interval = self.config.dispatch.poll_interval();

        loop {
            let report = poller.run_once(Utc::now()).await.context("poll pass failed")?;
            self.terminal.print_poll(&report)?;
            if once || cancel.load(Ordering::SeqCst) {
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.notified() => return Ok(()),
            }
        }
    }
}

fn selection_for(only: &[String], force_all: bool) -> Selection {
    let selection = if only.is_empty() {
        Selection::all()
    } else {
        Selection::only(only)
    };
    selection.with_force_all(force_all)
}

/// Set `cancel` on Ctrl+C; the returned notifier fires at the same time.
fn watch_ctrl_c(cancel: Arc<AtomicBool>) -> Arc<Notify> {
    let shutdown = Arc::new(Notify::new());
    let notify = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, finishing the in-flight send");
            cancel.store(true, Ordering::SeqCst);
            notify.notify_one();
        }
    });
    shutdown
}

#[cfg(test)]
mod tests {
    use mailcast_core::{RecipientTask, StorageConfig, StoreBackend};
    use mailcast_schedule::{Schedule, Zone};

    use super::*;

    fn task(to: &str) -> RecipientTask {
        RecipientTask::new(to, "s", "b", Schedule::immediate(&Zone::utc(), Utc::now()))
    }

    #[test]
    fn only_list_is_normalized() {
        let selection = selection_for(&["A@Mail.io".to_string()], false);
        assert!(selection.includes("a@mail.io"));
        assert!(!selection.includes("b@mail.io"));
        assert!(!selection.force_all);
        assert!(selection_for(&[], true).includes("anyone@mail.io"));
    }

    async fn app(dir: &Path) -> App {
        let mut config = Config::for_profile("");
        config.storage = StorageConfig {
            backend: StoreBackend::File,
            data_dir: dir.to_path_buf(),
        };
        App::new(config).await.unwrap()
    }

    #[tokio::test]
    async fn template_and_export_write_sheets() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = app(tmp.path()).await;

        let template = tmp.path().join("template.json");
        app.template(&template).await.unwrap();
        let rows = JsonTabular.parse_rows(&std::fs::read(&template).unwrap()).unwrap();
        assert!(!rows.is_empty());

        let mut job = Job::new(vec![task("a@mail.io"), task("b@mail.io")], None, Utc::now());
        job.mark_failed(1, "bounced").unwrap();
        app.store.jobs().save(&job).await.unwrap();

        let out = tmp.path().join("results.json");
        app.export(job.id, &out).await.unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(doc["sheets"].as_array().unwrap().len(), 2);
        assert_eq!(doc["sheets"][1]["rows"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_of_unknown_job_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = app(tmp.path()).await;
        let err = app.dispatch(Uuid::new_v4(), &[], false, false).await.unwrap_err();
        assert!(err.to_string().contains("failed to load job"), "got: {err:#}");
    }
}
