// src/services/verifier.rs
//! Certificate verification service.
//!
//! Re-derives the fingerprint of a presented document (when there is one),
//! looks the certificate up through the issuer, and turns the result into a
//! [`VerificationOutcome`]. Verification never mutates a record.

use crate::error::CertificateError;
use crate::models::certificate::{CertificateRecord, RecordId};
use crate::models::verification::{Outcome, Presentation, VerificationOutcome};
use crate::services::credential_issuer::{CertificateIssuer, LookupFilter};
use crate::utils::crypto::{fingerprint_owned, fingerprint_stream, Fingerprint};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use log::{info, warn};
use std::io;

/// Read-side projection over the certificate registry.
#[derive(Clone)]
pub struct Verifier {
    issuer: CertificateIssuer,
}

impl Verifier {
    /// Builds a verifier that reads through `issuer`'s lookups.
    pub fn new(issuer: CertificateIssuer) -> Self {
        Self { issuer }
    }

    /// Verifies a presented document, record id, or both.
    ///
    /// # Returns
    /// - `NotFound` if nothing matches
    /// - `Tampered` if a document was presented for a record whose stored
    ///   fingerprint differs
    /// - `Valid` if a matching record is active
    /// - `Revoked` otherwise, with the revocation details on the record
    ///
    /// # Errors
    /// `ReadFailure` if the document cannot be consumed, and the store's
    /// `PersistenceFailure` / `PersistenceTimeout`.
    pub async fn verify(&self, presentation: Presentation) -> Result<VerificationOutcome, CertificateError> {
        match presentation {
            Presentation::Document(document) => {
                let fingerprint = fingerprint_owned(document).await?;
                self.verify_fingerprint(fingerprint, None).await
            }
            Presentation::RecordId(record_id) => {
                let record = self.issuer.lookup_by_id(&record_id).await?;
                Ok(log_outcome(decide_for_record(record, None), &record_id))
            }
            Presentation::DocumentForRecord { document, record_id } => {
                let fingerprint = fingerprint_owned(document).await?;
                self.verify_fingerprint(fingerprint, Some(record_id)).await
            }
        }
    }

    /// Verifies a document arriving as a chunked stream.
    pub async fn verify_stream<S>(
        &self,
        chunks: S,
        claimed_record: Option<RecordId>,
    ) -> Result<VerificationOutcome, CertificateError>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let fingerprint = fingerprint_stream(chunks).await?;
        self.verify_fingerprint(fingerprint, claimed_record).await
    }

    /// Verifies an already computed fingerprint, optionally against a specific
    /// record.
    pub async fn verify_fingerprint(
        &self,
        fingerprint: Fingerprint,
        claimed_record: Option<RecordId>,
    ) -> Result<VerificationOutcome, CertificateError> {
        match claimed_record {
            Some(record_id) => {
                let record = self.issuer.lookup_by_id(&record_id).await?;
                let outcome = decide_for_record(record, Some(fingerprint));
                if outcome.outcome == Outcome::Tampered {
                    warn!("Presented document does not match certificate {}", record_id);
                }
                Ok(log_outcome(outcome, &record_id))
            }
            None => {
                let matches = self
                    .issuer
                    .lookup_by_fingerprint(&fingerprint, &LookupFilter::default())
                    .await?;
                let outcome = decide_for_matches(matches, fingerprint);
                info!(
                    "Verification by fingerprint -> {:?}{}",
                    outcome.outcome,
                    outcome
                        .record
                        .as_ref()
                        .map(|r| format!(" ({})", r.record_id))
                        .unwrap_or_default()
                );
                Ok(outcome)
            }
        }
    }
}

fn log_outcome(outcome: VerificationOutcome, record_id: &RecordId) -> VerificationOutcome {
    info!("Verification of {} -> {:?}", record_id, outcome.outcome);
    outcome
}

/// Decision for a lookup by record id, with the recomputed fingerprint when a
/// document was presented.
pub fn decide_for_record(
    record: Option<CertificateRecord>,
    presented: Option<Fingerprint>,
) -> VerificationOutcome {
    let outcome = match &record {
        None => Outcome::NotFound,
        Some(r) if presented.as_ref().is_some_and(|fp| *fp != r.fingerprint) => Outcome::Tampered,
        Some(r) if r.is_active() => Outcome::Valid,
        Some(_) => Outcome::Revoked,
    };
    VerificationOutcome {
        outcome,
        record,
        presented_fingerprint: presented,
        checked_at: Utc::now(),
    }
}

/// Decision for a lookup by fingerprint. Every candidate already carries the
/// presented fingerprint, so a mismatch cannot occur here: one active record
/// is enough for `Valid`, otherwise the oldest revoked record is reported.
pub fn decide_for_matches(matches: Vec<CertificateRecord>, presented: Fingerprint) -> VerificationOutcome {
    let (outcome, record) = match matches.iter().position(CertificateRecord::is_active) {
        Some(i) => (Outcome::Valid, matches.into_iter().nth(i)),
        None => match matches.into_iter().next() {
            Some(revoked) => (Outcome::Revoked, Some(revoked)),
            None => (Outcome::NotFound, None),
        },
    };
    VerificationOutcome {
        outcome,
        record,
        presented_fingerprint: Some(presented),
        checked_at: Utc::now(),
    }
}
