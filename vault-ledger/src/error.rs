// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::time::Duration;

use thiserror::Error;

use crate::ledger::TxHash;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {message}")]
    Unavailable { message: String },
    #[error("transaction submission failed: {message}")]
    Submission { message: String },
    #[error("transaction {tx} failed on chain")]
    Reverted { tx: TxHash },
    #[error("transaction {tx} not confirmed within {waited:?}")]
    ConfirmationTimeout { tx: TxHash, waited: Duration },
    #[error("unknown transaction {tx}")]
    UnknownTransaction { tx: TxHash },
    #[error("ledger session is closed")]
    SessionClosed,
    #[error("failed to build ledger connection: {message}")]
    Connect { message: String },
}

impl LedgerError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        LedgerError::Unavailable {
            message: message.into(),
        }
    }

    /// Transient transport failures only; anything that may have reached the chain is not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Unavailable { .. })
    }
}
