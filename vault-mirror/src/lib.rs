// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Off-chain mirror of vault accounts and the catalog of stored objects.
//!
//! [`AccountMirror`] and [`ObjectCatalog`] are the narrow document-store surface the
//! accounting engine depends on; [`InMemoryDocumentStore`] implements both, optionally
//! persisting a JSON snapshot under a state directory.

pub mod error;
pub mod model;
pub mod store;

pub use error::{MirrorError, Result};
pub use model::{AccountRecord, InsertOutcome, ObjectMetadata, StoredObject};
pub use store::InMemoryDocumentStore;

use chrono::{DateTime, Utc};
use core_types::{Address, ContentAddress};

/// Per-address balance/consumption mirror. Writers only touch their own address.
pub trait AccountMirror: Send + Sync {
    fn find_account(&self, address: &Address) -> Result<Option<AccountRecord>>;

    /// Returns the account, creating it with zero consumption and an unset balance.
    fn get_or_create(&self, address: &Address) -> Result<AccountRecord>;

    fn set_balance(&self, address: &Address, balance: i64) -> Result<()>;

    fn set_consumption(&self, address: &Address, consumption: i64) -> Result<()>;

    /// Accounts whose mirrored consumption is above zero.
    fn accounts_with_consumption(&self) -> Result<Vec<AccountRecord>>;
}

/// Catalog of stored objects keyed by id and by owner + content address.
pub trait ObjectCatalog: Send + Sync {
    /// Inserts unless the owner already has a live object with the same content address.
    fn insert_if_absent(&self, object: StoredObject) -> Result<InsertOutcome>;

    fn find_object(&self, id: &str) -> Result<Option<StoredObject>>;

    fn find_live(&self, owner: &Address, content: &ContentAddress) -> Result<Option<StoredObject>>;

    fn live_objects(&self, owner: &Address) -> Result<Vec<StoredObject>>;

    /// Marks one object deleted. Returns the updated object, or `None` for an unknown id.
    /// Already deleted objects keep their original deletion time.
    fn tombstone(&self, id: &str, at: DateTime<Utc>) -> Result<Option<StoredObject>>;

    /// Marks every live object of `owner` deleted and returns how many changed.
    fn tombstone_all(&self, owner: &Address, at: DateTime<Utc>) -> Result<usize>;
}
