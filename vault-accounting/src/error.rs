// Copyright (c) James Kassemi, SC, US. All rights reserved.
use core_types::Address;
use engine_api::EngineError;
use thiserror::Error;
use vault_ledger::LedgerError;
use vault_mirror::MirrorError;

pub type Result<T> = std::result::Result<T, AccountingError>;

#[derive(Debug, Error)]
pub enum AccountingError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("mirror error: {0}")]
    Mirror(#[from] MirrorError),
    #[error("consumption for {address} would exceed the ledger integer range")]
    Overflow { address: Address },
}

impl AccountingError {
    /// Read failures the caller may retry; writes are never reported retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccountingError::Ledger(err) if err.is_retryable())
    }
}

impl From<AccountingError> for EngineError {
    fn from(value: AccountingError) -> Self {
        EngineError::Failure {
            source: Box::new(value),
        }
    }
}
