// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;
use std::time::Duration;

use core_types::config::LedgerSettings;
use core_types::{Address, RetryPolicy, U256};
use log::debug;
use tokio::time::timeout;

use crate::error::{LedgerError, Result};
use crate::ledger::{PendingTx, TxReceipt, VaultLedger};

const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// Vault access with retried reads and bounded finality waits.
///
/// Writes are submitted exactly once; a failed or timed-out confirmation is
/// surfaced to the caller, who decides whether to resubmit.
pub struct LedgerClient {
    ledger: Arc<dyn VaultLedger>,
    read_retry: RetryPolicy,
    confirmation_timeout: Duration,
}

impl LedgerClient {
    pub fn new(ledger: Arc<dyn VaultLedger>) -> Self {
        Self {
            ledger,
            read_retry: RetryPolicy::default(),
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
        }
    }

    pub fn from_settings(ledger: Arc<dyn VaultLedger>, settings: &LedgerSettings) -> Self {
        Self::new(ledger)
            .with_read_retry(RetryPolicy::from(&settings.read_retry))
            .with_confirmation_timeout(settings.confirmation_timeout())
    }

    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    pub fn with_confirmation_timeout(mut self, limit: Duration) -> Self {
        self.confirmation_timeout = limit;
        self
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    pub async fn balance_of(&self, address: &Address) -> Result<U256> {
        self.read_retry
            .retry_async_when(LedgerError::is_retryable, |attempt| {
                if attempt > 0 {
                    debug!("retrying balance read for {} (attempt {})", address, attempt + 1);
                }
                self.ledger.balance_of(address)
            })
            .await
    }

    pub async fn consumption_of(&self, address: &Address) -> Result<U256> {
        self.read_retry
            .retry_async_when(LedgerError::is_retryable, |attempt| {
                if attempt > 0 {
                    debug!(
                        "retrying consumption read for {} (attempt {})",
                        address,
                        attempt + 1
                    );
                }
                self.ledger.consumption_of(address)
            })
            .await
    }

    /// Waits for finality of `tx`, bounded by the confirmation timeout.
    pub async fn confirm(&self, tx: &PendingTx) -> Result<TxReceipt> {
        match timeout(self.confirmation_timeout, self.ledger.wait_for_receipt(tx)).await {
            Ok(receipt) => receipt,
            Err(_) => Err(LedgerError::ConfirmationTimeout {
                tx: tx.hash.clone(),
                waited: self.confirmation_timeout,
            }),
        }
    }

    /// Writes `bytes` as the account's consumption and waits for a successful receipt.
    pub async fn set_consumption_confirmed(
        &self,
        address: &Address,
        bytes: U256,
    ) -> Result<TxReceipt> {
        let pending = self.ledger.set_consumption(address, bytes).await?;
        let receipt = self.confirm(&pending).await?;
        if !receipt.succeeded() {
            return Err(LedgerError::Reverted { tx: receipt.hash });
        }
        Ok(receipt)
    }

    /// Triggers settlement and waits for a successful receipt.
    pub async fn settle_confirmed(&self) -> Result<TxReceipt> {
        let pending = self.ledger.settle().await?;
        let receipt = self.confirm(&pending).await?;
        if !receipt.succeeded() {
            return Err(LedgerError::Reverted { tx: receipt.hash });
        }
        Ok(receipt)
    }
}
