// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::collections::HashMap;
use std::sync::Arc;

use core_types::Address;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1_024;

/// One async mutex per address. Operations on different addresses never contend.
#[derive(Default)]
pub struct AddressLocks {
    slots: Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>,
}

impl AddressLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `address`; released when the guard drops.
    pub async fn acquire(&self, address: &Address) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock();
            if slots.len() >= PRUNE_THRESHOLD {
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(slots.entry(address.clone()).or_default())
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().len()
    }
}
