// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::fmt;

use async_trait::async_trait;
use core_types::{Address, U256};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A submitted transaction; durable only once its receipt says so.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx {
    pub hash: TxHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub status: TxStatus,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == TxStatus::Success
    }
}

/// Remote surface of the vault contract.
///
/// Every call is a network round trip and may fail. Writes return a [`PendingTx`]
/// that must be passed to [`wait_for_receipt`](VaultLedger::wait_for_receipt)
/// before the caller treats the write as applied.
#[async_trait]
pub trait VaultLedger: Send + Sync + 'static {
    async fn balance_of(&self, address: &Address) -> Result<U256>;

    async fn consumption_of(&self, address: &Address) -> Result<U256>;

    async fn set_consumption(&self, address: &Address, bytes: U256) -> Result<PendingTx>;

    /// Triggers the contract's periodic payment extraction.
    async fn settle(&self) -> Result<PendingTx>;

    async fn wait_for_receipt(&self, tx: &PendingTx) -> Result<TxReceipt>;
}
