// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Upload and delete flows on top of the accounting engine: content storage,
//! duplicate suppression, consumption bookkeeping and upload announcements.

pub mod content;
pub mod error;
pub mod notifier;
pub mod service;

pub use content::{ContentStore, InMemoryContentStore};
pub use error::{Result, StorageError};
pub use notifier::{UploadEvent, UploadNotifier};
pub use service::{DeleteAllReport, UploadReceipt, UploadService};
