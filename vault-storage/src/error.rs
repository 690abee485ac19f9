// Copyright (c) James Kassemi, SC, US. All rights reserved.
use core_types::Address;
use thiserror::Error;
use vault_accounting::AccountingError;
use vault_mirror::MirrorError;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("empty upload")]
    Empty,
    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("insufficient vault balance for {address} to store {requested} more bytes")]
    InsufficientCapacity { address: Address, requested: u64 },
    #[error("object {id} not found")]
    NotFound { id: String },
    #[error("content store error: {message}")]
    Content { message: String },
    #[error(transparent)]
    Accounting(#[from] AccountingError),
    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

impl StorageError {
    pub fn content(message: impl Into<String>) -> Self {
        StorageError::Content {
            message: message.into(),
        }
    }
}
