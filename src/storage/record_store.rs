// src/storage/record_store.rs
//! Issuance record store interface.
//!
//! This is the seam where a ledger, database or remote registry plugs in. The
//! lifecycle manager is the only writer; it relies on `update_status` being a
//! compare-and-swap so two concurrent revocations cannot both win.

use crate::error::StoreError;
use crate::models::certificate::{CertificateRecord, CertificateStatus, RecordId, Revocation};
use crate::utils::crypto::Fingerprint;
use async_trait::async_trait;

/// Result of a compare-and-swap status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The stored status matched the expectation and was replaced.
    Applied(CertificateRecord),
    /// The stored status did not match; the record is returned as stored.
    Conflict(CertificateRecord),
}

/// Storage for certificate records.
///
/// Implementations must be safe to share across tasks. Records are never
/// deleted.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists a new record. Fails with `Duplicate` if the id is taken.
    async fn create(&self, record: CertificateRecord) -> Result<CertificateRecord, StoreError>;

    async fn get_by_id(&self, record_id: &RecordId) -> Result<Option<CertificateRecord>, StoreError>;

    /// All records sharing a fingerprint, oldest first.
    async fn get_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<CertificateRecord>, StoreError>;

    /// Moves `record_id` from `expected` to `new_status` if, and only if, its
    /// stored status is still `expected`.
    ///
    /// `revocation` must be present exactly when `new_status` is `Revoked`.
    async fn update_status(
        &self,
        record_id: &RecordId,
        expected: CertificateStatus,
        new_status: CertificateStatus,
        revocation: Option<Revocation>,
    ) -> Result<StatusUpdate, StoreError>;
}
