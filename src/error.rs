// src/error.rs
//! Error taxonomy for certificate fingerprinting, lifecycle and storage.
//!
//! `CertificateError` is what callers of the issuer and verifier see.
//! `StoreError` is the narrower vocabulary of a record store; the lifecycle
//! manager folds it into `CertificateError` at the store boundary.

use crate::models::certificate::{CertificateStatus, RecordId};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the certificate lifecycle and verification services.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The presented document could not be fully consumed.
    #[error("failed to read document: {0}")]
    ReadFailure(#[source] io::Error),

    /// No record exists for the referenced identifier.
    #[error("certificate record not found: {0}")]
    NotFound(RecordId),

    /// A caller-supplied value is malformed (bad digest, empty identity, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The record store rejected a write. The operation did not happen.
    #[error("record store rejected the operation: {0}")]
    PersistenceFailure(String),

    /// The record store did not answer within the configured timeout.
    #[error("record store did not respond within {0:?}")]
    PersistenceTimeout(Duration),
}

impl CertificateError {
    /// Whether a caller may reasonably retry the same call later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceTimeout(_))
    }
}

/// Errors a record store implementation may report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record does not exist.
    #[error("record {0} does not exist")]
    NotFound(RecordId),

    /// A record with the same id is already stored.
    #[error("record {0} already exists")]
    Duplicate(RecordId),

    /// The requested status change would move a record backwards.
    #[error("illegal status transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Status currently stored.
        from: CertificateStatus,
        /// Status that was requested.
        to: CertificateStatus,
    },

    /// The store refused a malformed request.
    #[error("store rejected request: {0}")]
    Rejected(String),

    /// The backing medium failed (I/O, serialization, remote rejection).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for CertificateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => CertificateError::NotFound(id),
            other => CertificateError::PersistenceFailure(other.to_string()),
        }
    }
}
