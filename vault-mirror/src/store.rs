// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use core_types::{Address, ContentAddress};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, Result};
use crate::model::{AccountRecord, InsertOutcome, StoredObject};
use crate::{AccountMirror, ObjectCatalog};

const SNAPSHOT_FILE: &str = "documents.json";

#[derive(Default)]
struct StoreState {
    accounts: HashMap<Address, AccountRecord>,
    objects: HashMap<String, StoredObject>,
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    accounts: Vec<AccountRecord>,
    objects: Vec<StoredObject>,
}

/// Document store kept in memory, optionally mirrored to `<state_dir>/documents.json`
/// after every mutation.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
    failing: Mutex<HashSet<Address>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or creates) a persistent store under `state_dir`.
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self> {
        let state_dir = state_dir.as_ref();
        fs::create_dir_all(state_dir).map_err(|source| MirrorError::Io {
            path: state_dir.to_path_buf(),
            source,
        })?;
        let path = state_dir.join(SNAPSHOT_FILE);
        let snapshot = if path.exists() {
            let data = fs::read(&path).map_err(|source| MirrorError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_slice::<Snapshot>(&data)?
        } else {
            Snapshot::default()
        };
        let state = StoreState {
            accounts: snapshot
                .accounts
                .into_iter()
                .map(|account| (account.address.clone(), account))
                .collect(),
            objects: snapshot
                .objects
                .into_iter()
                .map(|object| (object.id.clone(), object))
                .collect(),
        };
        info!(
            "document store opened at {:?} ({} accounts, {} objects)",
            path,
            state.accounts.len(),
            state.objects.len()
        );
        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
            failing: Mutex::new(HashSet::new()),
        })
    }

    /// Every write that touches `address` (account or owned objects) fails while set.
    pub fn fail_address(&self, address: &Address, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(address.clone());
        } else {
            set.remove(address);
        }
    }

    fn check_writable(&self, address: &Address) -> Result<()> {
        if self.failing.lock().contains(address) {
            return Err(MirrorError::Unavailable {
                message: format!("injected write failure for {address}"),
            });
        }
        Ok(())
    }

    /// Writes the snapshot `state` would have with `accounts` and `objects` applied.
    /// The in-memory maps are only touched by the caller once this succeeds.
    fn persist(
        &self,
        state: &StoreState,
        accounts: &[AccountRecord],
        objects: &[StoredObject],
    ) -> Result<()> {
        let Some(path) = self.snapshot_path.as_ref() else {
            return Ok(());
        };
        let mut merged_accounts: HashMap<&Address, &AccountRecord> =
            state.accounts.iter().collect();
        for account in accounts {
            merged_accounts.insert(&account.address, account);
        }
        let mut merged_objects: HashMap<&str, &StoredObject> = state
            .objects
            .iter()
            .map(|(id, object)| (id.as_str(), object))
            .collect();
        for object in objects {
            merged_objects.insert(object.id.as_str(), object);
        }
        let mut snapshot = Snapshot {
            accounts: merged_accounts.into_values().cloned().collect(),
            objects: merged_objects.into_values().cloned().collect(),
        };
        snapshot
            .accounts
            .sort_by(|a, b| a.address.cmp(&b.address));
        snapshot.objects.sort_by(|a, b| a.id.cmp(&b.id));
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(&snapshot)?;
        fs::write(&tmp, data).map_err(|source| MirrorError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| MirrorError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("document snapshot written to {:?}", path);
        Ok(())
    }

    fn update_account<F>(&self, address: &Address, apply: F) -> Result<()>
    where
        F: FnOnce(&mut AccountRecord),
    {
        self.check_writable(address)?;
        let created = self.get_or_create(address)?;
        let mut state = self.state.write();
        let mut account = state.accounts.get(address).cloned().unwrap_or(created);
        apply(&mut account);
        self.persist(&state, std::slice::from_ref(&account), &[])?;
        state.accounts.insert(address.clone(), account);
        Ok(())
    }
}

impl AccountMirror for InMemoryDocumentStore {
    fn find_account(&self, address: &Address) -> Result<Option<AccountRecord>> {
        Ok(self.state.read().accounts.get(address).cloned())
    }

    fn get_or_create(&self, address: &Address) -> Result<AccountRecord> {
        if let Some(account) = self.state.read().accounts.get(address) {
            return Ok(account.clone());
        }
        self.check_writable(address)?;
        let mut state = self.state.write();
        if let Some(account) = state.accounts.get(address) {
            return Ok(account.clone());
        }
        let account = AccountRecord::new(address.clone());
        self.persist(&state, std::slice::from_ref(&account), &[])?;
        state.accounts.insert(address.clone(), account.clone());
        Ok(account)
    }

    fn set_balance(&self, address: &Address, balance: i64) -> Result<()> {
        self.update_account(address, |account| account.balance = Some(balance))
    }

    fn set_consumption(&self, address: &Address, consumption: i64) -> Result<()> {
        self.update_account(address, |account| account.consumption = consumption)
    }

    fn accounts_with_consumption(&self) -> Result<Vec<AccountRecord>> {
        let mut accounts: Vec<_> = self
            .state
            .read()
            .accounts
            .values()
            .filter(|account| account.consumption > 0)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(accounts)
    }
}

impl ObjectCatalog for InMemoryDocumentStore {
    fn insert_if_absent(&self, object: StoredObject) -> Result<InsertOutcome> {
        self.check_writable(&object.owner)?;
        let mut state = self.state.write();
        if let Some(existing) = state.objects.values().find(|candidate| {
            candidate.is_live()
                && candidate.owner == object.owner
                && candidate.content_address == object.content_address
        }) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        if state.objects.contains_key(&object.id) {
            return Err(MirrorError::DuplicateId { id: object.id });
        }
        self.persist(&state, &[], std::slice::from_ref(&object))?;
        state.objects.insert(object.id.clone(), object.clone());
        Ok(InsertOutcome::Inserted(object))
    }

    fn find_object(&self, id: &str) -> Result<Option<StoredObject>> {
        Ok(self.state.read().objects.get(id).cloned())
    }

    fn find_live(&self, owner: &Address, content: &ContentAddress) -> Result<Option<StoredObject>> {
        Ok(self
            .state
            .read()
            .objects
            .values()
            .find(|object| {
                object.is_live() && &object.owner == owner && &object.content_address == content
            })
            .cloned())
    }

    fn live_objects(&self, owner: &Address) -> Result<Vec<StoredObject>> {
        let mut objects: Vec<_> = self
            .state
            .read()
            .objects
            .values()
            .filter(|object| object.is_live() && &object.owner == owner)
            .cloned()
            .collect();
        objects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(objects)
    }

    fn tombstone(&self, id: &str, at: DateTime<Utc>) -> Result<Option<StoredObject>> {
        let owner = match self.state.read().objects.get(id) {
            Some(object) => object.owner.clone(),
            None => return Ok(None),
        };
        self.check_writable(&owner)?;
        let mut state = self.state.write();
        let Some(object) = state.objects.get(id) else {
            return Ok(None);
        };
        if object.is_deleted {
            return Ok(Some(object.clone()));
        }
        let mut updated = object.clone();
        updated.is_deleted = true;
        updated.deleted_at = Some(at);
        self.persist(&state, &[], std::slice::from_ref(&updated))?;
        state.objects.insert(updated.id.clone(), updated.clone());
        Ok(Some(updated))
    }

    fn tombstone_all(&self, owner: &Address, at: DateTime<Utc>) -> Result<usize> {
        self.check_writable(owner)?;
        let mut state = self.state.write();
        let updated: Vec<StoredObject> = state
            .objects
            .values()
            .filter(|object| object.is_live() && &object.owner == owner)
            .map(|object| {
                let mut object = object.clone();
                object.is_deleted = true;
                object.deleted_at = Some(at);
                object
            })
            .collect();
        if updated.is_empty() {
            return Ok(0);
        }
        self.persist(&state, &[], &updated)?;
        let changed = updated.len();
        for object in updated {
            state.objects.insert(object.id.clone(), object);
        }
        Ok(changed)
    }
}
