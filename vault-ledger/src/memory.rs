// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use core_types::{Address, U256};
use log::debug;
use parking_lot::Mutex;

use crate::error::{LedgerError, Result};
use crate::ledger::{PendingTx, TxHash, TxReceipt, TxStatus, VaultLedger};
use crate::pricing::tokens_required;

#[derive(Debug, Clone, Copy, Default)]
struct VaultAccount {
    balance: U256,
    consumption: U256,
}

#[derive(Debug, Clone)]
enum PendingOp {
    SetConsumption { address: Address, bytes: U256 },
    Settle,
}

/// Process-local vault.
///
/// Writes are staged at submission and applied when their receipt is awaited,
/// so a rejected or never-awaited transaction leaves state untouched. Settlement
/// debits every account `tokens_required(consumption)` once, saturating at zero.
/// Fault switches let tests exercise every failure path of the engine.
#[derive(Default)]
pub struct InMemoryVault {
    accounts: Mutex<HashMap<Address, VaultAccount>>,
    pending: Mutex<HashMap<TxHash, PendingOp>>,
    next_tx: AtomicU64,
    failing_reads: AtomicUsize,
    failing_addresses: Mutex<HashSet<Address>>,
    reject_writes: AtomicBool,
    fail_submissions: AtomicBool,
    fail_settlement: AtomicBool,
    stall_confirmations: AtomicBool,
    confirmed_writes: AtomicUsize,
    settlements: AtomicUsize,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&self, address: &Address, amount: U256) {
        let mut accounts = self.accounts.lock();
        let account = accounts.entry(address.clone()).or_default();
        account.balance = account.balance.saturating_add(amount);
    }

    pub fn set_balance(&self, address: &Address, amount: U256) {
        self.accounts.lock().entry(address.clone()).or_default().balance = amount;
    }

    pub fn balance(&self, address: &Address) -> U256 {
        self.accounts
            .lock()
            .get(address)
            .map(|account| account.balance)
            .unwrap_or_default()
    }

    pub fn consumption(&self, address: &Address) -> U256 {
        self.accounts
            .lock()
            .get(address)
            .map(|account| account.consumption)
            .unwrap_or_default()
    }

    /// The next `count` reads fail with a retryable error.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Every read and write touching `address` fails while set.
    pub fn fail_address(&self, address: &Address, failing: bool) {
        let mut set = self.failing_addresses.lock();
        if failing {
            set.insert(address.clone());
        } else {
            set.remove(address);
        }
    }

    /// Consumption writes confirm with a failure receipt while set.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Submissions of any transaction error out while set.
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Settlement confirms with a failure receipt while set.
    pub fn fail_settlement(&self, fail: bool) {
        self.fail_settlement.store(fail, Ordering::SeqCst);
    }

    /// Receipt waits never resolve while set.
    pub fn stall_confirmations(&self, stall: bool) {
        self.stall_confirmations.store(stall, Ordering::SeqCst);
    }

    pub fn confirmed_writes(&self) -> usize {
        self.confirmed_writes.load(Ordering::SeqCst)
    }

    pub fn settlements(&self) -> usize {
        self.settlements.load(Ordering::SeqCst)
    }

    fn check_read(&self, address: &Address) -> Result<()> {
        let consumed = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(LedgerError::unavailable("injected read failure"));
        }
        if self.failing_addresses.lock().contains(address) {
            return Err(LedgerError::unavailable(format!(
                "injected failure for {address}"
            )));
        }
        Ok(())
    }

    fn submit(&self, op: PendingOp) -> Result<PendingTx> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(LedgerError::Submission {
                message: "injected submission failure".to_string(),
            });
        }
        if let PendingOp::SetConsumption { address, .. } = &op {
            if self.failing_addresses.lock().contains(address) {
                return Err(LedgerError::Submission {
                    message: format!("injected failure for {address}"),
                });
            }
        }
        let nonce = self.next_tx.fetch_add(1, Ordering::SeqCst) + 1;
        let hash = TxHash::new(format!("0x{nonce:064x}"));
        self.pending.lock().insert(hash.clone(), op);
        Ok(PendingTx { hash })
    }

    fn apply(&self, op: PendingOp) -> TxStatus {
        match op {
            PendingOp::SetConsumption { address, bytes } => {
                if self.reject_writes.load(Ordering::SeqCst) {
                    return TxStatus::Failure;
                }
                self.accounts.lock().entry(address).or_default().consumption = bytes;
                self.confirmed_writes.fetch_add(1, Ordering::SeqCst);
                TxStatus::Success
            }
            PendingOp::Settle => {
                if self.fail_settlement.load(Ordering::SeqCst) {
                    return TxStatus::Failure;
                }
                let mut accounts = self.accounts.lock();
                for (address, account) in accounts.iter_mut() {
                    let due = tokens_required(account.consumption).unwrap_or(U256::MAX);
                    account.balance = account.balance.saturating_sub(due);
                    debug!("settled {}: debited {}", address, due);
                }
                self.settlements.fetch_add(1, Ordering::SeqCst);
                TxStatus::Success
            }
        }
    }
}

#[async_trait]
impl VaultLedger for InMemoryVault {
    async fn balance_of(&self, address: &Address) -> Result<U256> {
        self.check_read(address)?;
        Ok(self.balance(address))
    }

    async fn consumption_of(&self, address: &Address) -> Result<U256> {
        self.check_read(address)?;
        Ok(self.consumption(address))
    }

    async fn set_consumption(&self, address: &Address, bytes: U256) -> Result<PendingTx> {
        self.submit(PendingOp::SetConsumption {
            address: address.clone(),
            bytes,
        })
    }

    async fn settle(&self) -> Result<PendingTx> {
        self.submit(PendingOp::Settle)
    }

    async fn wait_for_receipt(&self, tx: &PendingTx) -> Result<TxReceipt> {
        if self.stall_confirmations.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let op = self
            .pending
            .lock()
            .remove(&tx.hash)
            .ok_or_else(|| LedgerError::UnknownTransaction {
                tx: tx.hash.clone(),
            })?;
        let status = self.apply(op);
        Ok(TxReceipt {
            hash: tx.hash.clone(),
            status,
        })
    }
}
