// src/models/verification.rs
//! Verification request and result types.

use crate::models::certificate::{CertificateRecord, RecordId, Revocation};
use crate::utils::crypto::Fingerprint;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a verifier was handed.
#[derive(Debug, Clone)]
pub enum Presentation {
    /// Document bytes only; matched by fingerprint.
    Document(Bytes),
    /// A record identifier only; status check without content comparison.
    RecordId(RecordId),
    /// Document bytes claimed to belong to a specific record.
    DocumentForRecord { document: Bytes, record_id: RecordId },
}

/// Verdict of a verification.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Valid,
    /// The record exists but the presented content differs from what was issued.
    Tampered,
    Revoked,
    NotFound,
}

/// Immutable result of a verification.
///
/// `checked_at` marks when the store was read; a revocation committed on another
/// replica after that instant may not be reflected yet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<CertificateRecord>,
    /// Fingerprint recomputed from the presented document, if one was presented
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presented_fingerprint: Option<Fingerprint>,
    pub checked_at: DateTime<Utc>,
}

impl VerificationOutcome {
    /// Revocation details, present only for `Revoked` outcomes.
    pub fn revocation(&self) -> Option<&Revocation> {
        match self.outcome {
            Outcome::Revoked => self.record.as_ref().and_then(|r| r.revocation()),
            _ => None,
        }
    }
}
