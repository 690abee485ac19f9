// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;

use core_types::config::AccountingSettings;
use core_types::{to_bounded, Address, U256};
use log::{debug, warn};
use tokio::sync::OwnedMutexGuard;
use vault_ledger::LedgerSession;
use vault_mirror::AccountMirror;

use crate::error::{AccountingError, Result};
use crate::locks::AddressLocks;

/// Read-modify-write of ledger consumption, mirrored only after confirmation.
///
/// With per-address serialization on, concurrent deltas for one address are
/// applied one at a time; otherwise the last confirmed write wins.
pub struct ConsumptionLedger {
    session: Arc<LedgerSession>,
    mirror: Arc<dyn AccountMirror>,
    locks: Option<AddressLocks>,
}

impl ConsumptionLedger {
    pub fn new(
        session: Arc<LedgerSession>,
        mirror: Arc<dyn AccountMirror>,
        settings: &AccountingSettings,
    ) -> Self {
        Self {
            session,
            mirror,
            locks: settings.serialize_per_address.then(AddressLocks::new),
        }
    }

    pub fn session(&self) -> &Arc<LedgerSession> {
        &self.session
    }

    /// Exclusive access to `address` when serialization is enabled.
    pub async fn lock(&self, address: &Address) -> Option<OwnedMutexGuard<()>> {
        match &self.locks {
            Some(locks) => Some(locks.acquire(address).await),
            None => None,
        }
    }

    /// Adds `delta` bytes and returns the confirmed consumption.
    pub async fn increase(&self, address: &Address, delta: u64) -> Result<U256> {
        let _guard = self.lock(address).await;
        let client = self.session.client()?;
        let current = client.consumption_of(address).await?;
        let next = current
            .checked_add(U256::from(delta))
            .ok_or_else(|| AccountingError::Overflow {
                address: address.clone(),
            })?;
        self.write(address, next).await
    }

    /// Subtracts `delta` bytes, flooring at zero, and returns the confirmed consumption.
    pub async fn decrease(&self, address: &Address, delta: u64) -> Result<U256> {
        let _guard = self.lock(address).await;
        let client = self.session.client()?;
        let current = client.consumption_of(address).await?;
        let next = current.saturating_sub(U256::from(delta));
        self.write(address, next).await
    }

    /// Overwrites consumption with an absolute value.
    pub async fn set(&self, address: &Address, bytes: U256) -> Result<U256> {
        let _guard = self.lock(address).await;
        self.write(address, bytes).await
    }

    async fn write(&self, address: &Address, next: U256) -> Result<U256> {
        let client = self.session.client()?;
        let receipt = client.set_consumption_confirmed(address, next).await?;
        debug!("consumption for {} set to {} in {}", address, next, receipt.hash);
        // The ledger write is durable at this point; a lagging mirror is corrected by the next write.
        if let Err(err) = self.mirror.set_consumption(address, to_bounded(next)) {
            warn!("mirror update for {} failed after confirmed write: {}", address, err);
        }
        Ok(next)
    }
}
