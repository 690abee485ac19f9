// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Client side of the on-chain storage vault.
//!
//! The crate exposes:
//! - [`VaultLedger`]: the remote contract surface (reads, consumption writes, settlement, finality).
//! - [`LedgerClient`]: retrying reads and timeout-bounded confirmations on top of a [`VaultLedger`].
//! - [`LedgerSession`]: lazily built, shared client handle with explicit init/teardown/rotation.
//! - [`pricing`]: the bytes-to-tokens conversion shared with the contract.
//! - [`InMemoryVault`]: a process-local vault used by tests and the dev daemon.

pub mod client;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod pricing;
pub mod session;

pub use client::LedgerClient;
pub use error::{LedgerError, Result};
pub use ledger::{PendingTx, TxHash, TxReceipt, TxStatus, VaultLedger};
pub use memory::InMemoryVault;
pub use session::LedgerSession;
