// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use core_types::config::LedgerSettings;
use log::info;
use parking_lot::RwLock;

use crate::client::LedgerClient;
use crate::error::{LedgerError, Result};
use crate::ledger::VaultLedger;

type LedgerFactory = Box<dyn Fn() -> Result<Arc<dyn VaultLedger>> + Send + Sync>;

/// Shared, lazily built [`LedgerClient`].
///
/// The connection is constructed on first use and reused by every caller until
/// [`rotate`](Self::rotate) rebuilds it (credential change) or
/// [`teardown`](Self::teardown) closes the session. A closed session refuses
/// work until [`init`](Self::init) is called again.
pub struct LedgerSession {
    factory: LedgerFactory,
    settings: LedgerSettings,
    client: RwLock<Option<Arc<LedgerClient>>>,
    closed: AtomicBool,
    generation: AtomicU64,
}

impl LedgerSession {
    pub fn new<F>(settings: LedgerSettings, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn VaultLedger>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            settings,
            client: RwLock::new(None),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Session over an already connected ledger; rotation reuses the same handle.
    pub fn shared(settings: LedgerSettings, ledger: Arc<dyn VaultLedger>) -> Self {
        Self::new(settings, move || Ok(Arc::clone(&ledger)))
    }

    /// Opens the session (if closed) and builds the client if none exists yet.
    pub fn init(&self) -> Result<Arc<LedgerClient>> {
        self.closed.store(false, Ordering::SeqCst);
        self.client()
    }

    /// Current client, built on first use.
    pub fn client(&self) -> Result<Arc<LedgerClient>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LedgerError::SessionClosed);
        }
        if let Some(client) = self.client.read().as_ref() {
            return Ok(Arc::clone(client));
        }
        let mut guard = self.client.write();
        if let Some(client) = guard.as_ref() {
            return Ok(Arc::clone(client));
        }
        let client = self.build()?;
        *guard = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Replaces the client with a freshly constructed one.
    pub fn rotate(&self) -> Result<Arc<LedgerClient>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LedgerError::SessionClosed);
        }
        let client = self.build()?;
        *self.client.write() = Some(Arc::clone(&client));
        info!("ledger session rotated (generation {})", self.generation());
        Ok(client)
    }

    /// Drops the client and closes the session. In-flight callers keep their `Arc`.
    pub fn teardown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.client.write().take().is_some() {
            info!("ledger session closed");
        }
    }

    /// Number of clients built so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn build(&self) -> Result<Arc<LedgerClient>> {
        let ledger = (self.factory)()?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LedgerClient::from_settings(ledger, &self.settings)))
    }
}
