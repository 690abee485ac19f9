// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use core_types::config::ReconcileSettings;
use core_types::{to_bounded, Address, BalanceRefresh, U256};
use engine_api::{Engine, EngineError, EngineHealth, EngineResult, HealthStatus};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::{runtime::Runtime, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use vault_mirror::{AccountMirror, AccountRecord, ObjectCatalog};

use crate::consumption::ConsumptionLedger;
use crate::error::Result;

/// Outcome of one settlement + remediation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub settled: bool,
    pub candidates: usize,
    pub balances_refreshed: usize,
    pub remediated: usize,
    pub failures: usize,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.settled && self.failures == 0
    }
}

/// Periodic settlement and negative-balance remediation.
pub struct ReconciliationEngine {
    inner: Arc<ReconcileInner>,
}

impl ReconciliationEngine {
    pub fn new(
        settings: ReconcileSettings,
        consumption: Arc<ConsumptionLedger>,
        mirror: Arc<dyn AccountMirror>,
        catalog: Arc<dyn ObjectCatalog>,
    ) -> Self {
        Self {
            inner: ReconcileInner::new(settings, consumption, mirror, catalog),
        }
    }

    /// Runs a single pass outside the timer.
    pub async fn run_tick(&self) -> TickReport {
        self.inner.tick().await
    }

    pub fn last_report(&self) -> Option<TickReport> {
        self.inner.last_report.lock().clone()
    }
}

impl Engine for ReconciliationEngine {
    fn start(&self) -> EngineResult<()> {
        self.inner.start()
    }

    fn stop(&self) -> EngineResult<()> {
        self.inner.stop()
    }

    fn health(&self) -> EngineHealth {
        self.inner.health()
    }
}

struct ReconcileInner {
    settings: ReconcileSettings,
    consumption: Arc<ConsumptionLedger>,
    mirror: Arc<dyn AccountMirror>,
    catalog: Arc<dyn ObjectCatalog>,
    state: Mutex<EngineRuntimeState>,
    health: Mutex<EngineHealth>,
    last_report: Mutex<Option<TickReport>>,
    /// Accounts whose ledger consumption could not be zeroed; retried next tick
    /// even after they drop out of the mirrored candidates.
    pending: Mutex<HashSet<Address>>,
}

impl ReconcileInner {
    fn new(
        settings: ReconcileSettings,
        consumption: Arc<ConsumptionLedger>,
        mirror: Arc<dyn AccountMirror>,
        catalog: Arc<dyn ObjectCatalog>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            consumption,
            mirror,
            catalog,
            state: Mutex::new(EngineRuntimeState::Stopped),
            health: Mutex::new(EngineHealth::new(HealthStatus::Stopped, None)),
            last_report: Mutex::new(None),
            pending: Mutex::new(HashSet::new()),
        })
    }

    fn start(self: &Arc<Self>) -> EngineResult<()> {
        let mut guard = self.state.lock();
        if matches!(*guard, EngineRuntimeState::Running(_)) {
            return Err(EngineError::AlreadyRunning);
        }
        self.set_health(HealthStatus::Starting, None);
        let runtime = Runtime::new().map_err(EngineError::failure)?;
        let cancel = CancellationToken::new();
        let runner = Arc::clone(self);
        let cancel_clone = cancel.clone();
        let handle = runtime.spawn(async move {
            runner.run(cancel_clone).await;
        });
        *guard = EngineRuntimeState::Running(RuntimeBundle {
            runtime,
            handle,
            cancel,
        });
        info!(
            "[{}] reconciliation engine starting (every {:?})",
            self.settings.label,
            self.settings.interval()
        );
        Ok(())
    }

    fn stop(&self) -> EngineResult<()> {
        let mut guard = self.state.lock();
        let Some(bundle) = guard.take_running() else {
            return Err(EngineError::NotRunning);
        };
        bundle.cancel.cancel();
        if let Err(err) = RuntimeBundle::join(bundle) {
            error!(
                "[{}] reconciliation runtime join failed: {:?}",
                self.settings.label, err
            );
        }
        *guard = EngineRuntimeState::Stopped;
        self.set_health(HealthStatus::Stopped, None);
        Ok(())
    }

    fn health(&self) -> EngineHealth {
        self.health.lock().clone()
    }

    fn set_health(&self, status: HealthStatus, detail: Option<String>) {
        let mut guard = self.health.lock();
        guard.status = status;
        guard.detail = detail;
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.set_health(HealthStatus::Ready, None);
        if !self.settings.run_on_start {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleep(self.settings.interval()) => {}
            }
        }
        while !cancel.is_cancelled() {
            let report = self.tick().await;
            if report.is_clean() {
                self.set_health(HealthStatus::Ready, None);
            } else if !report.settled {
                self.set_health(
                    HealthStatus::Degraded,
                    Some("settlement failed; remediation skipped".to_string()),
                );
            } else {
                self.set_health(
                    HealthStatus::Degraded,
                    Some(format!("{} remediation step(s) failed", report.failures)),
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.settings.interval()) => {}
            }
        }
        self.set_health(HealthStatus::Stopped, None);
        info!("[{}] reconciliation engine stopped", self.settings.label);
    }

    async fn tick(&self) -> TickReport {
        let label = &self.settings.label;
        let mut report = TickReport::default();
        if let Err(err) = self.settle().await {
            warn!("[{}] settlement failed, skipping remediation: {}", label, err);
            *self.last_report.lock() = Some(report.clone());
            return report;
        }
        report.settled = true;

        let candidates = match self.mirror.accounts_with_consumption() {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!("[{}] candidate scan failed: {}", label, err);
                report.failures += 1;
                *self.last_report.lock() = Some(report.clone());
                return report;
            }
        };
        let retries: Vec<Address> = self
            .pending
            .lock()
            .iter()
            .filter(|address| !candidates.iter().any(|account| &account.address == *address))
            .cloned()
            .collect();
        report.candidates = candidates.len() + retries.len();

        for account in candidates {
            let balance = match self.current_balance(&account).await {
                Ok((balance, refreshed)) => {
                    if refreshed {
                        report.balances_refreshed += 1;
                    }
                    balance
                }
                Err(err) => {
                    warn!(
                        "[{}] balance refresh for {} failed: {}",
                        label, account.address, err
                    );
                    report.failures += 1;
                    continue;
                }
            };
            let retry = self.pending.lock().contains(&account.address);
            if balance < 0 || retry {
                report.remediated += 1;
                report.failures += self.remediate(&account.address, Some(balance)).await;
            }
        }
        for address in retries {
            report.remediated += 1;
            report.failures += self.remediate(&address, None).await;
        }

        info!(
            "[{}] reconciliation tick: {} candidates, {} balances refreshed, {} remediated, {} failures",
            label,
            report.candidates,
            report.balances_refreshed,
            report.remediated,
            report.failures
        );
        *self.last_report.lock() = Some(report.clone());
        report
    }

    async fn settle(&self) -> Result<()> {
        let client = self.consumption.session().client()?;
        let receipt = client.settle_confirmed().await?;
        debug!("[{}] settlement confirmed in {}", self.settings.label, receipt.hash);
        Ok(())
    }

    /// Mirrored balance, fetched from the ledger first when the refresh mode asks for it.
    async fn current_balance(&self, account: &AccountRecord) -> Result<(i64, bool)> {
        if let (BalanceRefresh::Lazy, Some(balance)) = (self.settings.balance_refresh, account.balance) {
            return Ok((balance, false));
        }
        let client = self.consumption.session().client()?;
        let live = to_bounded(client.balance_of(&account.address).await?);
        self.mirror.set_balance(&account.address, live)?;
        Ok((live, true))
    }

    /// Zeroes ledger consumption, tombstones every live object, zeroes mirrored
    /// consumption. Each step runs regardless of the others; returns the number that failed.
    /// `balance` is `None` when retrying an earlier failed ledger step.
    async fn remediate(&self, address: &Address, balance: Option<i64>) -> usize {
        let label = &self.settings.label;
        match balance {
            Some(balance) => warn!(
                "[{}] remediating {} (mirrored balance {})",
                label, address, balance
            ),
            None => warn!("[{}] retrying remediation of {}", label, address),
        }
        let _guard = self.consumption.lock(address).await;
        let mut failures = 0;

        let ledger_step = match self.consumption.session().client() {
            Ok(client) => client
                .set_consumption_confirmed(address, U256::zero())
                .await
                .map(|_| ()),
            Err(err) => Err(err),
        };
        match ledger_step {
            Ok(()) => {
                self.pending.lock().remove(address);
            }
            Err(err) => {
                error!("[{}] zeroing ledger consumption for {} failed: {}", label, address, err);
                self.pending.lock().insert(address.clone());
                failures += 1;
            }
        }

        match self.catalog.tombstone_all(address, Utc::now()) {
            Ok(count) => info!("[{}] tombstoned {} objects for {}", label, count, address),
            Err(err) => {
                error!("[{}] tombstoning objects for {} failed: {}", label, address, err);
                failures += 1;
            }
        }

        if let Err(err) = self.mirror.set_consumption(address, 0) {
            error!("[{}] zeroing mirrored consumption for {} failed: {}", label, address, err);
            failures += 1;
        }
        failures
    }
}

enum EngineRuntimeState {
    Stopped,
    Running(RuntimeBundle),
}

impl EngineRuntimeState {
    fn take_running(&mut self) -> Option<RuntimeBundle> {
        match std::mem::replace(self, EngineRuntimeState::Stopped) {
            EngineRuntimeState::Running(bundle) => Some(bundle),
            other => {
                *self = other;
                None
            }
        }
    }
}

struct RuntimeBundle {
    runtime: Runtime,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl RuntimeBundle {
    fn join(bundle: RuntimeBundle) -> std::result::Result<(), tokio::task::JoinError> {
        let RuntimeBundle {
            runtime,
            handle,
            cancel: _,
        } = bundle;
        runtime.block_on(async { handle.await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::config::{AccountingSettings, LedgerSettings, RetrySettings};
    use std::time::{Duration, Instant};
    use core_types::ContentAddress;
    use vault_ledger::pricing::{one_token, tokens_required};
    use vault_ledger::{InMemoryVault, LedgerSession, VaultLedger};
    use vault_mirror::{InMemoryDocumentStore, ObjectMetadata, StoredObject};

    struct Fixture {
        vault: Arc<InMemoryVault>,
        store: Arc<InMemoryDocumentStore>,
        engine: ReconciliationEngine,
    }

    fn addr(tag: u8) -> Address {
        Address::parse(&format!("0x{:040x}", tag)).unwrap()
    }

    fn fixture_with(settings: ReconcileSettings) -> Fixture {
        let vault = Arc::new(InMemoryVault::new());
        let store = Arc::new(InMemoryDocumentStore::new());
        let ledger: Arc<dyn VaultLedger> = vault.clone();
        let ledger_settings = LedgerSettings {
            confirmation_timeout_secs: 1,
            read_retry: RetrySettings {
                max_attempts: 1,
                base_delay_ms: 1,
                max_delay_ms: 1,
                jitter_pct: 0.0,
            },
        };
        let session = Arc::new(LedgerSession::shared(ledger_settings, ledger));
        let consumption = Arc::new(ConsumptionLedger::new(
            session,
            store.clone(),
            &AccountingSettings::default(),
        ));
        let engine =
            ReconciliationEngine::new(settings, consumption, store.clone(), store.clone());
        Fixture {
            vault,
            store,
            engine,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ReconcileSettings {
            label: "test".to_string(),
            ..ReconcileSettings::default()
        })
    }

    fn store_object(store: &InMemoryDocumentStore, id: &str, owner: &Address, size: u64) {
        store
            .insert_if_absent(StoredObject::new(
                id,
                owner.clone(),
                ContentAddress::new(format!("cid-{id}")),
                ObjectMetadata::from_name(format!("{id}.txt"), size),
            ))
            .unwrap();
    }

    async fn consume(fx: &Fixture, owner: &Address, bytes: u64) {
        let pending = fx
            .vault
            .set_consumption(owner, U256::from(bytes))
            .await
            .unwrap();
        fx.vault.wait_for_receipt(&pending).await.unwrap();
        fx.store.set_consumption(owner, bytes as i64).unwrap();
    }

    #[tokio::test]
    async fn negative_balance_account_is_remediated_once() {
        let fx = fixture();
        let owner = addr(1);
        consume(&fx, &owner, 2_048).await;
        store_object(&fx.store, "a", &owner, 1_024);
        store_object(&fx.store, "b", &owner, 1_024);
        fx.store.set_balance(&owner, -5).unwrap();

        let first = fx.engine.run_tick().await;
        assert!(first.is_clean());
        assert_eq!(first.candidates, 1);
        assert_eq!(first.remediated, 1);
        assert_eq!(fx.vault.consumption(&owner), U256::zero());
        assert!(fx.store.live_objects(&owner).unwrap().is_empty());
        assert_eq!(fx.store.find_account(&owner).unwrap().unwrap().consumption, 0);

        let writes = fx.vault.confirmed_writes();
        let second = fx.engine.run_tick().await;
        assert!(second.is_clean());
        assert_eq!(second.candidates, 0);
        assert_eq!(second.remediated, 0);
        assert_eq!(fx.vault.confirmed_writes(), writes);
        assert_eq!(fx.engine.last_report(), Some(second));
    }

    #[tokio::test]
    async fn settlement_failure_skips_remediation() {
        let fx = fixture();
        let owner = addr(1);
        consume(&fx, &owner, 2_048).await;
        store_object(&fx.store, "a", &owner, 2_048);
        fx.store.set_balance(&owner, -5).unwrap();
        fx.vault.fail_settlement(true);

        let report = fx.engine.run_tick().await;
        assert!(!report.settled);
        assert_eq!(report.candidates, 0);
        assert_eq!(fx.vault.consumption(&owner), U256::from(2_048u64));
        assert_eq!(fx.store.live_objects(&owner).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unset_balance_is_fetched_lazily() {
        let fx = fixture();
        let owner = addr(2);
        fx.vault.deposit(&owner, one_token());
        consume(&fx, &owner, 1_024).await;

        let report = fx.engine.run_tick().await;
        assert_eq!(report.balances_refreshed, 1);
        assert_eq!(report.remediated, 0);
        let mirrored = fx.store.find_account(&owner).unwrap().unwrap();
        let debited = tokens_required(U256::from(1_024u64)).unwrap();
        let expected = one_token() - debited;
        assert_eq!(mirrored.balance, Some(to_bounded(expected)));

        let again = fx.engine.run_tick().await;
        assert_eq!(again.balances_refreshed, 0);
    }

    #[tokio::test]
    async fn every_tick_mode_refreshes_populated_balances() {
        let fx = fixture_with(ReconcileSettings {
            label: "test".to_string(),
            balance_refresh: BalanceRefresh::EveryTick,
            ..ReconcileSettings::default()
        });
        let owner = addr(3);
        fx.vault.deposit(&owner, U256::from(10u64));
        consume(&fx, &owner, 1).await;
        fx.store.set_balance(&owner, -1).unwrap();

        let report = fx.engine.run_tick().await;
        assert_eq!(report.balances_refreshed, 1);
        // The live balance is non-negative, so the stale negative mirror is not acted on.
        assert_eq!(report.remediated, 0);
        assert_eq!(fx.vault.consumption(&owner), U256::from(1u64));
    }

    #[tokio::test]
    async fn failing_account_does_not_block_others() {
        let fx = fixture();
        let broken = addr(4);
        let healthy = addr(5);
        for owner in [&broken, &healthy] {
            consume(&fx, owner, 512).await;
            fx.store.set_balance(owner, -10).unwrap();
        }
        store_object(&fx.store, "broken-obj", &broken, 512);
        store_object(&fx.store, "healthy-obj", &healthy, 512);
        fx.vault.fail_address(&broken, true);

        let report = fx.engine.run_tick().await;
        assert!(report.settled);
        assert_eq!(report.remediated, 2);
        assert_eq!(report.failures, 1);

        // Ledger step failed for the broken account, the other sub-steps still ran.
        assert_eq!(fx.vault.consumption(&broken), U256::from(512u64));
        assert!(fx.store.live_objects(&broken).unwrap().is_empty());
        assert_eq!(fx.store.find_account(&broken).unwrap().unwrap().consumption, 0);

        assert_eq!(fx.vault.consumption(&healthy), U256::zero());
        assert!(fx.store.live_objects(&healthy).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_ledger_zeroing_is_retried_next_tick() {
        let fx = fixture();
        let owner = addr(7);
        consume(&fx, &owner, 512).await;
        fx.store.set_balance(&owner, -10).unwrap();
        store_object(&fx.store, "obj", &owner, 512);
        fx.vault.fail_address(&owner, true);

        let first = fx.engine.run_tick().await;
        assert_eq!(first.failures, 1);
        assert_eq!(fx.vault.consumption(&owner), U256::from(512u64));
        // The mirror no longer lists the account as a candidate.
        assert!(fx.store.accounts_with_consumption().unwrap().is_empty());

        fx.vault.fail_address(&owner, false);
        let second = fx.engine.run_tick().await;
        assert!(second.is_clean());
        assert_eq!(second.candidates, 1);
        assert_eq!(second.remediated, 1);
        assert_eq!(fx.vault.consumption(&owner), U256::zero());

        let writes = fx.vault.confirmed_writes();
        let third = fx.engine.run_tick().await;
        assert_eq!(third.candidates, 0);
        assert_eq!(third.remediated, 0);
        assert_eq!(fx.vault.confirmed_writes(), writes);
    }

    #[tokio::test]
    async fn mirror_failure_still_zeroes_ledger() {
        let fx = fixture();
        let owner = addr(6);
        consume(&fx, &owner, 256).await;
        fx.store.set_balance(&owner, -1).unwrap();
        fx.store.fail_address(&owner, true);

        let report = fx.engine.run_tick().await;
        assert_eq!(report.remediated, 1);
        assert_eq!(report.failures, 2);
        assert_eq!(fx.vault.consumption(&owner), U256::zero());
    }

    #[test]
    fn engine_runs_first_tick_on_start_and_stops() {
        let fx = fixture_with(ReconcileSettings {
            label: "lifecycle".to_string(),
            run_on_start: true,
            ..ReconcileSettings::default()
        });
        fx.engine.start().unwrap();
        assert!(matches!(fx.engine.start(), Err(EngineError::AlreadyRunning)));

        let deadline = Instant::now() + Duration::from_secs(5);
        while fx.engine.last_report().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(fx.vault.settlements(), 1);
        assert_eq!(fx.engine.health().status, HealthStatus::Ready);

        fx.engine.stop().unwrap();
        assert_eq!(fx.engine.health().status, HealthStatus::Stopped);
        assert!(matches!(fx.engine.stop(), Err(EngineError::NotRunning)));
    }

    #[test]
    fn failed_settlement_degrades_health() {
        let fx = fixture_with(ReconcileSettings {
            label: "degraded".to_string(),
            run_on_start: true,
            ..ReconcileSettings::default()
        });
        fx.vault.fail_settlement(true);
        fx.engine.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while fx.engine.health().status != HealthStatus::Degraded && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        let health = fx.engine.health();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.detail.is_some());
        fx.engine.stop().unwrap();
    }
}
