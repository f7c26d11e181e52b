// src/storage/json_file.rs
//! JSON snapshot record store.
//!
//! Keeps the full record table in memory and rewrites a JSON snapshot file
//! after every successful mutation.
//!
//! # Features
//! - Atomic snapshot replacement (write to a temp file, then rename)
//! - A mutation only becomes visible once its snapshot is on disk
//! - Snapshot validation on open (status/revocation pairing, duplicate ids)
//!
//! # Limitations
//! - Every write rewrites the whole file; suited to registries of modest size
//! - Single process only: two processes sharing one file will overwrite each other

use crate::error::StoreError;
use crate::models::certificate::{CertificateRecord, CertificateStatus, RecordId, Revocation};
use crate::storage::memory::RecordTable;
use crate::storage::record_store::{RecordStore, StatusUpdate};
use crate::utils::crypto::Fingerprint;
use crate::utils::serialization::{deserialize, serialize};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk layout.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    records: Vec<CertificateRecord>,
}

/// File-backed record store.
pub struct JsonFileRecordStore {
    path: PathBuf,
    table: RwLock<RecordTable>,
}

impl JsonFileRecordStore {
    /// Opens the snapshot at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    /// `Backend` if the file cannot be read or parsed, or holds an
    /// inconsistent or duplicated record.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let table = match fs::read_to_string(&path).await {
            Ok(text) => Self::load(&text)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No snapshot at {}, starting with an empty registry", path.display());
                RecordTable::default()
            }
            Err(e) => return Err(StoreError::Backend(format!("reading {}: {}", path.display(), e))),
        };
        info!("Loaded {} certificate records from {}", table.len(), path.display());
        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    fn load(text: &str) -> Result<RecordTable, StoreError> {
        let snapshot: Snapshot =
            deserialize(text).map_err(|e| StoreError::Backend(format!("corrupt snapshot: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Backend(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        let mut table = RecordTable::default();
        for record in snapshot.records {
            table
                .insert(record)
                .map_err(|e| StoreError::Backend(format!("corrupt snapshot: {}", e)))?;
        }
        Ok(table)
    }

    async fn persist(&self, table: &RecordTable) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            records: table.records(),
        };
        let json = serialize(&snapshot).map_err(|e| StoreError::Backend(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Backend(format!("writing {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Backend(format!("replacing {}: {}", self.path.display(), e)))?;
        debug!("Wrote snapshot of {} records to {}", snapshot.records.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn create(&self, record: CertificateRecord) -> Result<CertificateRecord, StoreError> {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        let created = next.insert(record)?;
        self.persist(&next).await?;
        *table = next;
        Ok(created)
    }

    async fn get_by_id(&self, record_id: &RecordId) -> Result<Option<CertificateRecord>, StoreError> {
        Ok(self.table.read().await.get(record_id))
    }

    async fn get_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<CertificateRecord>, StoreError> {
        Ok(self.table.read().await.by_fingerprint(fingerprint))
    }

    async fn update_status(
        &self,
        record_id: &RecordId,
        expected: CertificateStatus,
        new_status: CertificateStatus,
        revocation: Option<Revocation>,
    ) -> Result<StatusUpdate, StoreError> {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        let update = next.update_status(record_id, expected, new_status, revocation)?;
        if let StatusUpdate::Applied(_) = update {
            self.persist(&next).await?;
            *table = next;
        }
        Ok(update)
    }
}
