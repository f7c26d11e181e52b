// src/models/certificate.rs
//! Certificate issuance record data model.
//!
//! A `CertificateRecord` binds the fingerprint of a credential document to the
//! issuing party, the credential holder and descriptive metadata. Everything but
//! the status is fixed at issuance; the status moves once from `Active` to
//! `Revoked` and never back.

use crate::utils::crypto::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Free-form credential description (course, institution, dates, ...).
pub type Metadata = BTreeMap<String, String>;

/// Opaque record identifier.
///
/// Safe to use as a map key and as a URL path segment: never empty and never
/// containing whitespace or slashes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Allocates a fresh identifier. UUID v4 keeps concurrent allocation
    /// collision-free without coordination.
    pub fn generate() -> Self {
        RecordId(format!("cert-{}", Uuid::new_v4().simple()))
    }

    /// Validates an identifier supplied by a caller.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err("record id must not be empty".into());
        }
        if raw.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
            return Err(format!("record id {raw:?} contains whitespace or a slash"));
        }
        Ok(RecordId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RecordId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RecordId::parse(&value)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// Lifecycle status of a certificate.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Active,
    Revoked,
}

impl CertificateStatus {
    /// Only `Active -> Revoked` is a legal transition.
    pub fn can_transition_to(self, next: CertificateStatus) -> bool {
        matches!((self, next), (CertificateStatus::Active, CertificateStatus::Revoked))
    }
}

/// Who revoked a certificate, when and why.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub reason: String,
    pub revoked_by: String,
    pub revoked_at: DateTime<Utc>,
}

/// An immutable issuance record.
///
/// `status` and `revocation` are private so the "revocation present iff
/// revoked" invariant can only change through [`CertificateRecord::revoked`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    /// Identifier allocated at issuance
    pub record_id: RecordId,

    /// SHA-512 digest of the credential document at issuance time
    pub fingerprint: Fingerprint,

    /// Identity of the issuing institution
    /// Example: "univ-1"
    pub issuer: String,

    /// Identity of the credential holder
    /// Example: "alice@example.edu"
    pub recipient: String,

    /// Credential description
    /// Example: {"course": "CS101"}
    pub metadata: Metadata,

    status: CertificateStatus,

    pub issued_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    revocation: Option<Revocation>,
}

impl CertificateRecord {
    /// Builds a fresh `Active` record with a newly allocated id.
    pub fn new(
        fingerprint: Fingerprint,
        issuer: String,
        recipient: String,
        metadata: Metadata,
        issued_at: DateTime<Utc>,
    ) -> Self {
        CertificateRecord {
            record_id: RecordId::generate(),
            fingerprint,
            issuer,
            recipient,
            metadata,
            status: CertificateStatus::Active,
            issued_at,
            revocation: None,
        }
    }

    pub fn status(&self) -> CertificateStatus {
        self.status
    }

    pub fn revocation(&self) -> Option<&Revocation> {
        self.revocation.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.status == CertificateStatus::Active
    }

    /// Returns the revoked form of this record. A record that is already
    /// revoked is returned unchanged so the first revocation is kept.
    pub fn revoked(mut self, revocation: Revocation) -> Self {
        if self.status == CertificateStatus::Active {
            self.status = CertificateStatus::Revoked;
            self.revocation = Some(revocation);
        }
        self
    }

    /// Checks the status/revocation pairing. Used when records come back from
    /// an external medium rather than from [`CertificateRecord::new`].
    pub fn is_consistent(&self) -> bool {
        match self.status {
            CertificateStatus::Active => self.revocation.is_none(),
            CertificateStatus::Revoked => self.revocation.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::fingerprint;

    fn sample_record() -> CertificateRecord {
        let mut metadata = Metadata::new();
        metadata.insert("course".into(), "CS101".into());
        CertificateRecord::new(
            fingerprint(b"diploma"),
            "univ-1".into(),
            "alice@example.edu".into(),
            metadata,
            Utc::now(),
        )
    }

    #[test]
    fn test_record_ids_are_path_safe_and_unique() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert_ne!(a, b);
        assert!(RecordId::parse(a.as_str()).is_ok());
        assert!(RecordId::parse("").is_err());
        assert!(RecordId::parse("a/b").is_err());
        assert!(RecordId::parse("a b").is_err());
    }

    #[test]
    fn test_status_only_moves_forward() {
        assert!(CertificateStatus::Active.can_transition_to(CertificateStatus::Revoked));
        assert!(!CertificateStatus::Revoked.can_transition_to(CertificateStatus::Active));
        assert!(!CertificateStatus::Revoked.can_transition_to(CertificateStatus::Revoked));
        assert!(!CertificateStatus::Active.can_transition_to(CertificateStatus::Active));
    }

    #[test]
    fn test_revoked_keeps_first_revocation() {
        let first = Revocation {
            reason: "issued in error".into(),
            revoked_by: "admin-1".into(),
            revoked_at: Utc::now(),
        };
        let second = Revocation {
            reason: "duplicate".into(),
            revoked_by: "admin-2".into(),
            revoked_at: Utc::now(),
        };

        let record = sample_record().revoked(first.clone()).revoked(second);
        assert_eq!(record.status(), CertificateStatus::Revoked);
        assert_eq!(record.revocation(), Some(&first));
        assert!(record.is_consistent());
    }

    #[test]
    fn test_serialized_shape() {
        let record = sample_record();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "active");
        assert!(json.get("revocation").is_none());
        assert_eq!(json["fingerprint"].as_str().unwrap().len(), 128);

        let back: CertificateRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_inconsistent_record_is_detected() {
        let mut json = serde_json::to_value(sample_record()).unwrap();
        json["status"] = "revoked".into();
        let record: CertificateRecord = serde_json::from_value(json).unwrap();
        assert!(!record.is_consistent());
    }
}
