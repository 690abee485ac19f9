// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("object id {id} already exists")]
    DuplicateId { id: String },
    #[error("document store unavailable: {message}")]
    Unavailable { message: String },
}
