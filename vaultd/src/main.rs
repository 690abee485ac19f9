// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{
    path::PathBuf,
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

use clap::Parser;
use config::ConfigError;
use core_types::AppConfig;
use engine_api::{Engine, EngineError};
use log::{info, warn};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use vault_accounting::{ConsumptionLedger, ReconciliationEngine};
use vault_ledger::{InMemoryVault, LedgerError, LedgerSession, VaultLedger};
use vault_mirror::{InMemoryDocumentStore, MirrorError};

const STATUS_LOG_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Parser)]
#[command(name = "vaultd")]
#[command(about = "Vault consumption accounting and reconciliation daemon")]
struct Args {
    /// Configuration file; `config.toml` in the working directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log: String,
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log))
        .init();
    if let Err(err) = run(args) {
        eprintln!("vaultd failed: {err}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), AppError> {
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path, true)?,
        None => AppConfig::load()?,
    };

    let store = Arc::new(InMemoryDocumentStore::open(&config.storage.state_dir)?);
    let vault: Arc<dyn VaultLedger> = Arc::new(InMemoryVault::new());
    let session = Arc::new(LedgerSession::shared(config.ledger.clone(), vault));
    session.init()?;

    let consumption = Arc::new(ConsumptionLedger::new(
        Arc::clone(&session),
        store.clone(),
        &config.accounting,
    ));
    let engine = Arc::new(ReconciliationEngine::new(
        config.reconcile.clone(),
        consumption,
        store.clone(),
        store,
    ));

    info!(
        "vaultd [{}] booted; state at {:?}, settlement every {:.2}h",
        config.reconcile.label,
        config.storage.state_dir,
        config.reconcile.interval_hours()
    );

    engine.start()?;
    let status_logger = StatusLogger::spawn(
        Arc::clone(&engine),
        Duration::from_secs(STATUS_LOG_INTERVAL_SECS),
    );
    info!("reconciliation engine running; press Ctrl+C to shut down");

    wait_for_shutdown_signal()?;

    status_logger.shutdown();
    engine.stop()?;
    session.teardown();
    info!("vaultd stopped");
    Ok(())
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mirror(#[from] MirrorError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("failed while waiting for shutdown signal: {0}")]
    ShutdownWait(#[from] mpsc::RecvError),
}

fn wait_for_shutdown_signal() -> Result<(), AppError> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    rx.recv()?;
    Ok(())
}

struct StatusLogger {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StatusLogger {
    fn spawn(engine: Arc<ReconciliationEngine>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !stop_clone.load(Ordering::Relaxed) {
                sleep_with_stop(&stop_clone, interval);
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }
                log_status(&engine);
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusLogger {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn log_status(engine: &ReconciliationEngine) {
    let health = engine.health();
    if health.is_running() && health.detail.is_none() {
        info!("reconciliation status: {:?}", health.status);
    } else {
        warn!(
            "reconciliation status: {:?} ({:?})",
            health.status, health.detail
        );
    }
    if let Some(report) = engine.last_report() {
        info!(
            "last tick: settled={} candidates={} remediated={} failures={}",
            report.settled, report.candidates, report.remediated, report.failures
        );
    }
}

fn sleep_with_stop(stop: &AtomicBool, interval: Duration) {
    let mut remaining = interval;
    const STEP: Duration = Duration::from_millis(500);
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let sleep_for = remaining.min(STEP);
        thread::sleep(sleep_for);
        remaining = remaining.saturating_sub(sleep_for);
    }
}
