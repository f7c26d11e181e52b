// src/storage/memory.rs
//! In-memory record store.
//!
//! Keeps records by id plus a fingerprint index. All mutations take the write
//! half of a single `RwLock`, which is the serialization point for the status
//! compare-and-swap.

use crate::error::StoreError;
use crate::models::certificate::{CertificateRecord, CertificateStatus, RecordId, Revocation};
use crate::storage::record_store::{RecordStore, StatusUpdate};
use crate::utils::crypto::Fingerprint;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Plain record table shared by the in-memory and file-backed stores.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordTable {
    records: HashMap<RecordId, CertificateRecord>,
    /// Ids per fingerprint in insertion order
    by_fingerprint: HashMap<Fingerprint, Vec<RecordId>>,
}

impl RecordTable {
    pub(crate) fn insert(&mut self, record: CertificateRecord) -> Result<CertificateRecord, StoreError> {
        if self.records.contains_key(&record.record_id) {
            return Err(StoreError::Duplicate(record.record_id));
        }
        if !record.is_consistent() {
            return Err(StoreError::Rejected(format!(
                "record {} has a status that disagrees with its revocation details",
                record.record_id
            )));
        }
        self.by_fingerprint
            .entry(record.fingerprint.clone())
            .or_default()
            .push(record.record_id.clone());
        self.records.insert(record.record_id.clone(), record.clone());
        Ok(record)
    }

    pub(crate) fn get(&self, record_id: &RecordId) -> Option<CertificateRecord> {
        self.records.get(record_id).cloned()
    }

    pub(crate) fn by_fingerprint(&self, fingerprint: &Fingerprint) -> Vec<CertificateRecord> {
        self.by_fingerprint
            .get(fingerprint)
            .map(|ids| ids.iter().filter_map(|id| self.records.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn update_status(
        &mut self,
        record_id: &RecordId,
        expected: CertificateStatus,
        new_status: CertificateStatus,
        revocation: Option<Revocation>,
    ) -> Result<StatusUpdate, StoreError> {
        let current = self
            .records
            .get(record_id)
            .ok_or_else(|| StoreError::NotFound(record_id.clone()))?;

        if current.status() != expected {
            return Ok(StatusUpdate::Conflict(current.clone()));
        }
        if !expected.can_transition_to(new_status) {
            return Err(StoreError::IllegalTransition {
                from: expected,
                to: new_status,
            });
        }

        let revocation = match (new_status, revocation) {
            (CertificateStatus::Revoked, Some(revocation)) => revocation,
            _ => {
                return Err(StoreError::Rejected(
                    "revocation details must accompany a revoked status".into(),
                ))
            }
        };

        let updated = current.clone().revoked(revocation);
        self.records.insert(record_id.clone(), updated.clone());
        Ok(StatusUpdate::Applied(updated))
    }

    /// All records, oldest first; ties broken by id for a stable order.
    pub(crate) fn records(&self) -> Vec<CertificateRecord> {
        let mut all: Vec<_> = self.records.values().cloned().collect();
        all.sort_by(|a, b| {
            a.issued_at
                .cmp(&b.issued_at)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        all
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

/// Thread-safe in-memory store.
///
/// # Note
/// Contents are lost on restart; use [`super::json_file::JsonFileRecordStore`]
/// when records must survive the process.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    table: RwLock<RecordTable>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, record: CertificateRecord) -> Result<CertificateRecord, StoreError> {
        self.table.write().await.insert(record)
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
        self.table
            .write()
            .await
            .update_status(record_id, expected, new_status, revocation)
    }
}
