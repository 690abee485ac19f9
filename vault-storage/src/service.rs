// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_types::config::{ReconcileSettings, StorageSettings};
use core_types::{Address, ContentAddress, U256};
use log::{info, warn};
use serde::Serialize;
use vault_accounting::{CapacityCheck, ConsumptionLedger};
use vault_mirror::{InsertOutcome, ObjectCatalog, ObjectMetadata, StoredObject};

use crate::content::ContentStore;
use crate::error::{Result, StorageError};
use crate::notifier::UploadNotifier;

const OBJECT_ID_BYTES: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub id: String,
    pub content_address: ContentAddress,
    pub metadata: ObjectMetadata,
    pub created_at: DateTime<Utc>,
    /// The owner already had this content; nothing was stored or charged.
    pub duplicate: bool,
}

impl UploadReceipt {
    fn from_object(object: &StoredObject, duplicate: bool) -> Self {
        Self {
            id: object.id.clone(),
            content_address: object.content_address.clone(),
            metadata: object.metadata.clone(),
            created_at: object.created_at,
            duplicate,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAllReport {
    pub deleted: usize,
    /// Content addresses whose records could not be tombstoned.
    pub failed: Vec<ContentAddress>,
    pub total_deleted_bytes: u64,
}

/// Admission, storage and bookkeeping for one owner's objects.
pub struct UploadService {
    capacity: CapacityCheck,
    consumption: Arc<ConsumptionLedger>,
    catalog: Arc<dyn ObjectCatalog>,
    content: Arc<dyn ContentStore>,
    notifier: Arc<UploadNotifier>,
    max_upload_bytes: u64,
}

impl UploadService {
    pub fn new(
        consumption: Arc<ConsumptionLedger>,
        catalog: Arc<dyn ObjectCatalog>,
        content: Arc<dyn ContentStore>,
        notifier: Arc<UploadNotifier>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            capacity: CapacityCheck::new(Arc::clone(consumption.session())),
            consumption,
            catalog,
            content,
            notifier,
            max_upload_bytes,
        }
    }

    /// Builds the service with a fresh notifier sized from `storage`, pricing events
    /// over the settlement period in `reconcile`.
    pub fn from_settings(
        consumption: Arc<ConsumptionLedger>,
        catalog: Arc<dyn ObjectCatalog>,
        content: Arc<dyn ContentStore>,
        storage: &StorageSettings,
        reconcile: &ReconcileSettings,
    ) -> Self {
        let notifier = UploadNotifier::new(storage.recent_uploads, reconcile.interval_hours());
        Self::new(
            consumption,
            catalog,
            content,
            Arc::new(notifier),
            storage.max_upload_bytes,
        )
    }

    pub fn notifier(&self) -> &Arc<UploadNotifier> {
        &self.notifier
    }

    pub async fn upload(&self, owner: &Address, name: &str, bytes: &[u8]) -> Result<UploadReceipt> {
        let size = bytes.len() as u64;
        if size == 0 {
            return Err(StorageError::Empty);
        }
        if size > self.max_upload_bytes {
            return Err(StorageError::TooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        info!("upload request: owner={} name={} size={}", owner, name, size);

        if !self.capacity.has_capacity(owner, size).await? {
            warn!("insufficient vault balance: owner={} size={}", owner, size);
            return Err(StorageError::InsufficientCapacity {
                address: owner.clone(),
                requested: size,
            });
        }

        let precomputed = self.content.hash(bytes).await?;
        if let Some(existing) = self.catalog.find_live(owner, &precomputed)? {
            info!(
                "duplicate upload: owner={} content={} id={}",
                owner, precomputed, existing.id
            );
            return Ok(UploadReceipt::from_object(&existing, true));
        }

        let content_address = self.content.put(bytes).await?;
        if let Err(err) = self.consumption.increase(owner, size).await {
            self.release(&content_address).await;
            return Err(err.into());
        }

        let object = StoredObject::new(
            new_object_id(),
            owner.clone(),
            content_address.clone(),
            ObjectMetadata::from_name(name, size),
        );
        let stored = match self.catalog.insert_if_absent(object) {
            Ok(InsertOutcome::Inserted(stored)) => stored,
            Ok(InsertOutcome::Existing(existing)) => {
                // A concurrent upload of the same content won; undo this charge and pin.
                self.refund(owner, size).await;
                self.release(&content_address).await;
                return Ok(UploadReceipt::from_object(&existing, true));
            }
            Err(err) => {
                self.refund(owner, size).await;
                self.release(&content_address).await;
                return Err(err.into());
            }
        };
        info!(
            "stored object: owner={} id={} content={}",
            owner, stored.id, stored.content_address
        );

        let event = self.notifier.event(
            owner.clone(),
            stored.content_address.clone(),
            stored.created_at,
            size,
        );
        self.notifier.publish(event);
        Ok(UploadReceipt::from_object(&stored, false))
    }

    /// Deletes one of `owner`'s objects. Deleting an already deleted object succeeds.
    pub async fn delete(&self, owner: &Address, id: &str) -> Result<()> {
        let object = match self.catalog.find_object(id)? {
            Some(object) if &object.owner == owner => object,
            _ => {
                return Err(StorageError::NotFound { id: id.to_string() });
            }
        };
        if object.is_deleted {
            return Ok(());
        }
        // The pin is only dropped once the record is tombstoned, so a failed delete
        // can be retried without releasing the same pin twice.
        self.catalog.tombstone(id, Utc::now())?;
        let charged = self.consumption.decrease(owner, object.size_bytes()).await;
        self.release(&object.content_address).await;
        charged?;
        info!("deleted object: owner={} id={}", owner, id);
        Ok(())
    }

    /// Tombstones every live object of `owner` and settles consumption accordingly.
    pub async fn delete_all(&self, owner: &Address) -> Result<DeleteAllReport> {
        let objects = self.catalog.live_objects(owner)?;
        let mut report = DeleteAllReport::default();
        if objects.is_empty() {
            return Ok(report);
        }
        let now = Utc::now();
        for object in &objects {
            match self.catalog.tombstone(&object.id, now) {
                Ok(_) => {
                    self.release(&object.content_address).await;
                    report.deleted += 1;
                    report.total_deleted_bytes += object.size_bytes();
                }
                Err(err) => {
                    warn!("tombstone of {} for {} failed: {}", object.id, owner, err);
                    report.failed.push(object.content_address.clone());
                }
            }
        }

        if report.failed.is_empty() {
            self.consumption.set(owner, U256::zero()).await?;
        } else if report.total_deleted_bytes > 0 {
            self.consumption
                .decrease(owner, report.total_deleted_bytes)
                .await?;
        }
        info!(
            "delete all: owner={} total={} failed={}",
            owner,
            objects.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Catalog record by id, deleted or not.
    pub fn metadata(&self, id: &str) -> Result<StoredObject> {
        self.catalog
            .find_object(id)?
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    async fn release(&self, address: &ContentAddress) {
        if let Err(err) = self.content.remove(address).await {
            warn!("best-effort removal of {} failed: {}", address, err);
        }
    }

    async fn refund(&self, owner: &Address, size: u64) {
        if let Err(err) = self.consumption.decrease(owner, size).await {
            warn!("refund of {} bytes for {} failed: {}", size, owner, err);
        }
    }
}

fn new_object_id() -> String {
    let bytes: [u8; OBJECT_ID_BYTES] = rand::random();
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
