// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use core_types::ContentAddress;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::{Result, StorageError};

/// Content-addressed blob storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores `bytes` (adding a pin) and returns their address.
    async fn put(&self, bytes: &[u8]) -> Result<ContentAddress>;

    /// Address `bytes` would be stored under, without storing them.
    async fn hash(&self, bytes: &[u8]) -> Result<ContentAddress>;

    /// Drops one pin. Callers treat failures as best-effort.
    async fn remove(&self, address: &ContentAddress) -> Result<()>;
}

pub fn content_address(bytes: &[u8]) -> ContentAddress {
    ContentAddress::new(format!("{:x}", Sha256::digest(bytes)))
}

struct Blob {
    bytes: Vec<u8>,
    pins: usize,
}

/// SHA-256 addressed store with pin counting; blobs are dropped with their last pin.
#[derive(Default)]
pub struct InMemoryContentStore {
    blobs: Mutex<HashMap<ContentAddress, Blob>>,
    fail_puts: AtomicBool,
    fail_removes: AtomicBool,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, address: &ContentAddress) -> bool {
        self.blobs.lock().contains_key(address)
    }

    pub fn pins(&self, address: &ContentAddress) -> usize {
        self.blobs
            .lock()
            .get(address)
            .map(|blob| blob.pins)
            .unwrap_or_default()
    }

    pub fn get(&self, address: &ContentAddress) -> Option<Vec<u8>> {
        self.blobs.lock().get(address).map(|blob| blob.bytes.clone())
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, bytes: &[u8]) -> Result<ContentAddress> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::content("injected put failure"));
        }
        let address = content_address(bytes);
        let mut blobs = self.blobs.lock();
        let blob = blobs.entry(address.clone()).or_insert_with(|| Blob {
            bytes: bytes.to_vec(),
            pins: 0,
        });
        blob.pins += 1;
        Ok(address)
    }

    async fn hash(&self, bytes: &[u8]) -> Result<ContentAddress> {
        Ok(content_address(bytes))
    }

    async fn remove(&self, address: &ContentAddress) -> Result<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StorageError::content("injected remove failure"));
        }
        let mut blobs = self.blobs.lock();
        if let Some(blob) = blobs.get_mut(address) {
            blob.pins = blob.pins.saturating_sub(1);
            if blob.pins == 0 {
                blobs.remove(address);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_matches_put_without_storing() {
        let store = InMemoryContentStore::new();
        let hashed = store.hash(b"hello").await.unwrap();
        assert!(!store.contains(&hashed));
        let stored = store.put(b"hello").await.unwrap();
        assert_eq!(hashed, stored);
        assert_eq!(
            stored.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(store.get(&stored).unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn blob_survives_until_last_pin_removed() {
        let store = InMemoryContentStore::new();
        let address = store.put(b"shared").await.unwrap();
        store.put(b"shared").await.unwrap();
        assert_eq!(store.pins(&address), 2);
        store.remove(&address).await.unwrap();
        assert!(store.contains(&address));
        store.remove(&address).await.unwrap();
        assert!(!store.contains(&address));
        // Removing an unknown address is not an error.
        store.remove(&address).await.unwrap();
    }

    #[tokio::test]
    async fn injected_failures_surface() {
        let store = InMemoryContentStore::new();
        store.fail_puts(true);
        assert!(store.put(b"x").await.is_err());
        store.fail_puts(false);
        let address = store.put(b"x").await.unwrap();
        store.fail_removes(true);
        assert!(store.remove(&address).await.is_err());
        assert!(store.contains(&address));
    }
}
