//! delivery-worker: polls the scheduled-delivery store and sends what is due.
//!
//! Every `POLL_INTERVAL_SECS` it runs one pass of at most `POLL_BATCH_SIZE`
//! records. SIGINT/SIGTERM stop it after the in-flight send.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use mailcast_core::{load_dotenv, Config};
use mailcast_notify::Poller;
use mailcast_storage::StoreHandle;

// ── CLI ─────────────────────────────────────────────────────────────

/// Scheduled delivery worker.
#[derive(Parser, Debug)]
#[command(name = "delivery-worker", version, about)]
struct Cli {
    /// Seconds between poll passes (overrides POLL_INTERVAL_SECS).
    #[arg(long)]
    interval: Option<u64>,

    /// Records per pass (overrides POLL_BATCH_SIZE).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Run a single pass and exit.
    #[arg(long)]
    once: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    if !config.sender.is_configured() {
        warn!("default sender incomplete; only jobs carrying their own credentials can be delivered");
    }

    let store = StoreHandle::from_config(&config.storage)
        .await
        .context("failed to open store")?;
    if !store.is_durable() {
        warn!("in-memory store: the worker will only see records written by this process");
    }

    let mut poller = Poller::from_config(&config, &store).context("failed to build DNS resolver")?;
    if let Some(batch_size) = cli.batch_size {
        poller = poller.with_batch_size(batch_size);
    }
    let interval = cli
        .interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.dispatch.poll_interval());

    let cancel = poller.cancel_flag();
    let shutdown = Arc::new(Notify::new());
    {
        let cancel = cancel.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            os_signal().await;
            info!("shutdown signal received");
            cancel.store(true, Ordering::SeqCst);
            shutdown.notify_one();
        });
    }

    info!(interval_secs = interval.as_secs(), once = cli.once, "delivery-worker starting");
    loop {
        match poller.run_once(Utc::now()).await {
            Ok(report) if report.found > 0 => info!(
                found = report.found,
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                "poll pass finished"
            ),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "poll pass failed"),
        }

        if cli.once || cancel.load(Ordering::SeqCst) {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.notified() => break,
        }
    }

    info!("delivery-worker exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl_c");
    }
}
