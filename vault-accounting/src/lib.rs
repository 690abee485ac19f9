// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Consumption accounting against the storage vault.
//!
//! - [`CapacityCheck`] admits uploads against live ledger state.
//! - [`ConsumptionLedger`] applies consumption deltas: ledger first, mirror after confirmation.
//! - [`ReconciliationEngine`] settles periodically and remediates accounts whose balance went negative.

pub mod capacity;
pub mod consumption;
pub mod error;
pub mod locks;
pub mod reconcile;

pub use capacity::CapacityCheck;
pub use consumption::ConsumptionLedger;
pub use error::{AccountingError, Result};
pub use locks::AddressLocks;
pub use reconcile::{ReconciliationEngine, TickReport};
