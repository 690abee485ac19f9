// Copyright (c) James Kassemi, SC, US. All rights reserved.
use chrono::{DateTime, Utc};
use core_types::{Address, ContentAddress};
use serde::{Deserialize, Serialize};

/// Mirrored view of one vault account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub address: Address,
    /// `None` until the reconciliation loop has fetched it from the ledger.
    #[serde(default)]
    pub balance: Option<i64>,
    #[serde(default)]
    pub consumption: i64,
    pub created_at: DateTime<Utc>,
}

impl AccountRecord {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            balance: None,
            consumption: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub name: String,
    pub size_bytes: u64,
    pub extension: String,
}

impl ObjectMetadata {
    /// Extension is the lower-cased suffix after the last dot, empty when there is none.
    pub fn from_name(name: impl Into<String>, size_bytes: u64) -> Self {
        let name = name.into();
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            name,
            size_bytes,
            extension,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: String,
    pub owner: Address,
    pub content_address: ContentAddress,
    pub metadata: ObjectMetadata,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl StoredObject {
    pub fn new(
        id: impl Into<String>,
        owner: Address,
        content_address: ContentAddress,
        metadata: ObjectMetadata,
    ) -> Self {
        Self {
            id: id.into(),
            owner,
            content_address,
            metadata,
            is_deleted: false,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.metadata.size_bytes
    }

    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(StoredObject),
    /// A live object with the same owner and content address already existed.
    Existing(StoredObject),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_suffix() {
        assert_eq!(ObjectMetadata::from_name("Report.PDF", 1).extension, "pdf");
        assert_eq!(ObjectMetadata::from_name("archive.tar.gz", 1).extension, "gz");
        assert_eq!(ObjectMetadata::from_name("README", 1).extension, "");
    }

    #[test]
    fn new_account_has_unset_balance() {
        let account = AccountRecord::new(
            Address::parse("0x00000000000000000000000000000000000000aa").unwrap(),
        );
        assert_eq!(account.balance, None);
        assert_eq!(account.consumption, 0);
    }
}
