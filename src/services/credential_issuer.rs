// src/services/credential_issuer.rs
//! Certificate Issuer Service
//!
//! Owns every code path that creates or mutates a [`CertificateRecord`]:
//! - Issuance: binds a document fingerprint to issuer, recipient and metadata
//! - Revocation: moves a record from `Active` to `Revoked`, once
//! - Lookup: by record id, or by fingerprint with optional narrowing
//!
//! Store writes are dispatched on a detached task. Dropping the future returned
//! by [`CertificateIssuer::issue`] or [`CertificateIssuer::revoke`] after the
//! write was dispatched does not cancel the write.

use crate::error::{CertificateError, StoreError};
use crate::models::certificate::{CertificateRecord, CertificateStatus, Metadata, RecordId, Revocation};
use crate::services::audit::{AuditAction, AuditEvent, AuditLog};
use crate::storage::record_store::{RecordStore, StatusUpdate};
use crate::utils::crypto::{fingerprint_owned, Fingerprint};
use bytes::Bytes;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Optional narrowing of a fingerprint lookup.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupFilter {
    pub issuer: Option<String>,
    pub recipient: Option<String>,
}

impl LookupFilter {
    pub fn matches(&self, record: &CertificateRecord) -> bool {
        self.issuer.as_deref().map_or(true, |i| i == record.issuer)
            && self.recipient.as_deref().map_or(true, |r| r == record.recipient)
    }
}

/// Lifecycle manager for certificate records.
#[derive(Clone)]
pub struct CertificateIssuer {
    /// Backing record store
    store: Arc<dyn RecordStore>,

    /// Audit trail of effective mutations
    audit: Arc<AuditLog>,

    /// Upper bound on every store call
    store_timeout: Duration,
}

impl CertificateIssuer {
    /// Creates a new issuer over `store`.
    ///
    /// # Arguments
    /// * `store` - Record store shared with the verifier
    /// * `audit` - Audit log that receives issuance and revocation events
    /// * `store_timeout` - Deadline applied to each store call
    pub fn new(store: Arc<dyn RecordStore>, audit: Arc<AuditLog>, store_timeout: Duration) -> Self {
        Self {
            store,
            audit,
            store_timeout,
        }
    }

    /// Issues a certificate for an already computed fingerprint.
    ///
    /// # Arguments
    /// * `fingerprint` - 128-character lowercase hex SHA-512 digest
    /// * `issuer` - Identity of the issuing party, non-empty
    /// * `recipient` - Identity of the credential holder, non-empty
    /// * `metadata` - Credential description
    ///
    /// # Errors
    /// - `InvalidInput` for a malformed digest or an empty identity
    /// - `PersistenceFailure` if the store rejects the write; no record exists
    /// - `PersistenceTimeout` if the store does not answer in time
    pub async fn issue(
        &self,
        fingerprint: &str,
        issuer: &str,
        recipient: &str,
        metadata: Metadata,
    ) -> Result<CertificateRecord, CertificateError> {
        let fingerprint = Fingerprint::parse(fingerprint).map_err(CertificateError::InvalidInput)?;
        let issuer = require_identity("issuer", issuer)?;
        let recipient = require_identity("recipient", recipient)?;

        let record = CertificateRecord::new(fingerprint, issuer, recipient, metadata, Utc::now());
        let record_id = record.record_id.clone();
        let event = AuditEvent {
            action: AuditAction::Issued,
            record_id: record_id.clone(),
            actor: record.issuer.clone(),
            at: record.issued_at,
            detail: record.recipient.clone(),
        };

        let store = Arc::clone(&self.store);
        let audit = Arc::clone(&self.audit);
        let created = self
            .dispatch_write(async move {
                let created = store.create(record).await?;
                audit.append(event).await;
                Ok::<_, StoreError>(created)
            })
            .await
            .map_err(|e| {
                error!("Issuing certificate {} failed: {}", record_id, e);
                e
            })?;

        info!(
            "Issued certificate {} to {} on behalf of {}",
            created.record_id, created.recipient, created.issuer
        );
        Ok(created)
    }

    /// Fingerprints `document` and issues a certificate for it.
    pub async fn issue_document(
        &self,
        document: Bytes,
        issuer: &str,
        recipient: &str,
        metadata: Metadata,
    ) -> Result<CertificateRecord, CertificateError> {
        let fingerprint = fingerprint_owned(document).await?;
        self.issue(fingerprint.as_str(), issuer, recipient, metadata).await
    }

    /// Revokes a certificate.
    ///
    /// Revoking an already revoked certificate returns the stored record
    /// unchanged; the first revocation's reason, author and time are kept.
    ///
    /// # Errors
    /// - `InvalidInput` for a malformed id or an empty reason/author
    /// - `NotFound` if no record has this id
    /// - `PersistenceFailure` / `PersistenceTimeout` from the store; the status
    ///   is unchanged on failure
    pub async fn revoke(
        &self,
        record_id: &str,
        reason: &str,
        revoked_by: &str,
    ) -> Result<CertificateRecord, CertificateError> {
        let record_id = RecordId::parse(record_id).map_err(CertificateError::InvalidInput)?;
        let reason = require_identity("revocation reason", reason)?;
        let revoked_by = require_identity("revoked_by", revoked_by)?;

        let current = self
            .lookup_by_id(&record_id)
            .await?
            .ok_or_else(|| CertificateError::NotFound(record_id.clone()))?;
        if current.status() == CertificateStatus::Revoked {
            info!("Certificate {} already revoked, keeping first revocation", record_id);
            return Ok(current);
        }

        let revocation = Revocation {
            reason: reason.clone(),
            revoked_by: revoked_by.clone(),
            revoked_at: Utc::now(),
        };
        let event = AuditEvent {
            action: AuditAction::Revoked,
            record_id: record_id.clone(),
            actor: revoked_by,
            at: revocation.revoked_at,
            detail: reason,
        };

        let store = Arc::clone(&self.store);
        let audit = Arc::clone(&self.audit);
        let id = record_id.clone();
        let update = self
            .dispatch_write(async move {
                let update = store
                    .update_status(
                        &id,
                        CertificateStatus::Active,
                        CertificateStatus::Revoked,
                        Some(revocation),
                    )
                    .await?;
                if let StatusUpdate::Applied(_) = update {
                    audit.append(event).await;
                }
                Ok::<_, StoreError>(update)
            })
            .await
            .map_err(|e| {
                error!("Revoking certificate {} failed: {}", record_id, e);
                e
            })?;

        match update {
            StatusUpdate::Applied(record) => {
                info!("Revoked certificate {}", record.record_id);
                Ok(record)
            }
            StatusUpdate::Conflict(record) => {
                warn!(
                    "Certificate {} was revoked concurrently, returning the stored revocation",
                    record.record_id
                );
                Ok(record)
            }
        }
    }

    pub async fn lookup_by_id(
        &self,
        record_id: &RecordId,
    ) -> Result<Option<CertificateRecord>, CertificateError> {
        self.read(self.store.get_by_id(record_id)).await
    }

    /// Every record carrying `fingerprint` that passes `filter`, oldest first.
    pub async fn lookup_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        filter: &LookupFilter,
    ) -> Result<Vec<CertificateRecord>, CertificateError> {
        let records = self.read(self.store.get_by_fingerprint(fingerprint)).await?;
        debug!("{} records share fingerprint {}", records.len(), &fingerprint.as_str()[..16]);
        Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
    }

    /// Runs a read under the store deadline. Dropping the returned future
    /// abandons the read.
    async fn read<T>(
        &self,
        read: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, CertificateError> {
        timeout(self.store_timeout, read)
            .await
            .map_err(|_| CertificateError::PersistenceTimeout(self.store_timeout))?
            .map_err(Into::into)
    }

    /// Runs a write on its own task so it completes even if the caller goes
    /// away, and waits for it up to the store deadline.
    ///
    /// On `PersistenceTimeout` the write may still land; callers should look
    /// the record up before retrying.
    async fn dispatch_write<T, F>(&self, write: F) -> Result<T, CertificateError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let handle = tokio::spawn(write);
        match timeout(self.store_timeout, handle).await {
            Err(_) => Err(CertificateError::PersistenceTimeout(self.store_timeout)),
            Ok(Err(join_err)) => Err(CertificateError::PersistenceFailure(format!(
                "store task failed: {}",
                join_err
            ))),
            Ok(Ok(result)) => result.map_err(Into::into),
        }
    }
}

fn require_identity(field: &str, value: &str) -> Result<String, CertificateError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CertificateError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::memory::InMemoryRecordStore;
    use crate::utils::crypto::fingerprint;
    use async_trait::async_trait;

    /// Delays every call before delegating to an in-memory store.
    pub(crate) struct SlowStore {
        pub(crate) inner: InMemoryRecordStore,
        pub(crate) delay: Duration,
    }

    #[async_trait]
    impl RecordStore for SlowStore {
        async fn create(&self, record: CertificateRecord) -> Result<CertificateRecord, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.create(record).await
        }

        async fn get_by_id(&self, id: &RecordId) -> Result<Option<CertificateRecord>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get_by_id(id).await
        }

        async fn get_by_fingerprint(
            &self,
            fp: &Fingerprint,
        ) -> Result<Vec<CertificateRecord>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get_by_fingerprint(fp).await
        }

        async fn update_status(
            &self,
            id: &RecordId,
            expected: CertificateStatus,
            new_status: CertificateStatus,
            revocation: Option<Revocation>,
        ) -> Result<StatusUpdate, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.update_status(id, expected, new_status, revocation).await
        }
    }

    /// Serves reads from an in-memory store and rejects every write.
    struct RejectingStore {
        inner: InMemoryRecordStore,
    }

    #[async_trait]
    impl RecordStore for RejectingStore {
        async fn create(&self, _record: CertificateRecord) -> Result<CertificateRecord, StoreError> {
            Err(StoreError::Backend("ledger unavailable".into()))
        }

        async fn get_by_id(&self, id: &RecordId) -> Result<Option<CertificateRecord>, StoreError> {
            self.inner.get_by_id(id).await
        }

        async fn get_by_fingerprint(
            &self,
            fp: &Fingerprint,
        ) -> Result<Vec<CertificateRecord>, StoreError> {
            self.inner.get_by_fingerprint(fp).await
        }

        async fn update_status(
            &self,
            _id: &RecordId,
            _expected: CertificateStatus,
            _new_status: CertificateStatus,
            _revocation: Option<Revocation>,
        ) -> Result<StatusUpdate, StoreError> {
            Err(StoreError::Backend("ledger unavailable".into()))
        }
    }

    pub(crate) fn course(name: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("course".into(), name.into());
        metadata
    }

    fn issuer_over(store: Arc<dyn RecordStore>) -> (CertificateIssuer, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new());
        (
            CertificateIssuer::new(store, Arc::clone(&audit), Duration::from_secs(2)),
            audit,
        )
    }

    #[tokio::test]
    async fn test_issue_creates_active_record() {
        let (issuer, audit) = issuer_over(Arc::new(InMemoryRecordStore::new()));
        let fp = format!("{}{}", "aa".repeat(62), "11".repeat(2));

        let record = issuer
            .issue(&fp, "univ-1", "alice@example.edu", course("CS101"))
            .await
            .unwrap();

        assert_eq!(record.status(), CertificateStatus::Active);
        assert!(!record.record_id.as_str().is_empty());
        assert_eq!(record.fingerprint.as_str(), fp);
        assert_eq!(record.metadata["course"], "CS101");
        assert!(record.revocation().is_none());

        let events = audit.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Issued);
        assert_eq!(events[0].actor, "univ-1");
    }

    #[tokio::test]
    async fn test_issue_validates_input() {
        let (issuer, _) = issuer_over(Arc::new(InMemoryRecordStore::new()));
        let fp = fingerprint(b"doc");

        let bad_digest = issuer.issue("abc", "univ-1", "alice", Metadata::new()).await;
        assert!(matches!(bad_digest, Err(CertificateError::InvalidInput(_))));

        let no_issuer = issuer.issue(fp.as_str(), "  ", "alice", Metadata::new()).await;
        assert!(matches!(no_issuer, Err(CertificateError::InvalidInput(_))));

        let no_recipient = issuer.issue(fp.as_str(), "univ-1", "", Metadata::new()).await;
        assert!(matches!(no_recipient, Err(CertificateError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_identical_documents_get_distinct_records() {
        let (issuer, _) = issuer_over(Arc::new(InMemoryRecordStore::new()));
        let doc = Bytes::from_static(b"identical diploma template");

        let a = issuer
            .issue_document(doc.clone(), "univ-1", "alice", course("CS101"))
            .await
            .unwrap();
        let b = issuer
            .issue_document(doc, "univ-1", "bob", course("CS101"))
            .await
            .unwrap();
        assert_ne!(a.record_id, b.record_id);
        assert_eq!(a.fingerprint, b.fingerprint);

        let all = issuer
            .lookup_by_fingerprint(&a.fingerprint, &LookupFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let bobs = issuer
            .lookup_by_fingerprint(
                &a.fingerprint,
                &LookupFilter {
                    recipient: Some("bob".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(bobs, vec![b]);
    }

    #[tokio::test]
    async fn test_issue_persistence_failure_leaves_nothing() {
        let (issuer, audit) = issuer_over(Arc::new(RejectingStore {
            inner: InMemoryRecordStore::new(),
        }));
        let fp = fingerprint(b"doc");

        let err = issuer
            .issue(fp.as_str(), "univ-1", "alice", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CertificateError::PersistenceFailure(_)));
        assert!(issuer
            .lookup_by_fingerprint(&fp, &LookupFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert!(audit.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (issuer, audit) = issuer_over(Arc::new(InMemoryRecordStore::new()));
        let record = issuer
            .issue(fingerprint(b"doc").as_str(), "univ-1", "alice", Metadata::new())
            .await
            .unwrap();
        let id = record.record_id.as_str();

        let first = issuer.revoke(id, "issued in error", "admin-1").await.unwrap();
        let second = issuer.revoke(id, "duplicate", "admin-2").await.unwrap();

        assert_eq!(first.status(), CertificateStatus::Revoked);
        assert_eq!(second, first);
        let revocation = second.revocation().unwrap();
        assert_eq!(revocation.reason, "issued in error");
        assert_eq!(revocation.revoked_by, "admin-1");

        let revocations = audit
            .events_for(&record.record_id)
            .await
            .into_iter()
            .filter(|e| e.action == AuditAction::Revoked)
            .count();
        assert_eq!(revocations, 1);
    }

    #[tokio::test]
    async fn test_revoke_errors() {
        let (issuer, _) = issuer_over(Arc::new(InMemoryRecordStore::new()));
        let record = issuer
            .issue(fingerprint(b"doc").as_str(), "univ-1", "alice", Metadata::new())
            .await
            .unwrap();

        assert!(matches!(
            issuer.revoke("cert-unknown", "reason", "admin-1").await,
            Err(CertificateError::NotFound(_))
        ));
        assert!(matches!(
            issuer.revoke(record.record_id.as_str(), " ", "admin-1").await,
            Err(CertificateError::InvalidInput(_))
        ));
        assert!(matches!(
            issuer.revoke(record.record_id.as_str(), "reason", "").await,
            Err(CertificateError::InvalidInput(_))
        ));
        assert!(matches!(
            issuer.revoke("bad/id", "reason", "admin-1").await,
            Err(CertificateError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_persistence_failure_keeps_status() {
        let inner = InMemoryRecordStore::new();
        let seeded = inner
            .create(CertificateRecord::new(
                fingerprint(b"doc"),
                "univ-1".into(),
                "alice".into(),
                Metadata::new(),
                Utc::now(),
            ))
            .await
            .unwrap();
        let store = Arc::new(RejectingStore { inner });
        let (issuer, _) = issuer_over(store.clone());

        let err = issuer
            .revoke(seeded.record_id.as_str(), "fraud", "admin-1")
            .await
            .unwrap_err();
        assert!(matches!(err, CertificateError::PersistenceFailure(_)));
        assert!(store.get_by_id(&seeded.record_id).await.unwrap().unwrap().is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_revocations_converge() {
        let store = Arc::new(SlowStore {
            inner: InMemoryRecordStore::new(),
            delay: Duration::from_millis(20),
        });
        let (issuer, audit) = issuer_over(store);
        let issuer = Arc::new(issuer);
        let record = issuer
            .issue(fingerprint(b"doc").as_str(), "univ-1", "alice", Metadata::new())
            .await
            .unwrap();
        let id = record.record_id.to_string();

        let (a, b) = tokio::join!(
            {
                let issuer = Arc::clone(&issuer);
                let id = id.clone();
                tokio::spawn(async move { issuer.revoke(&id, "reason A", "user-a").await })
            },
            {
                let issuer = Arc::clone(&issuer);
                let id = id.clone();
                tokio::spawn(async move { issuer.revoke(&id, "reason B", "user-b").await })
            }
        );
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();

        assert_eq!(a.revocation(), b.revocation());
        let stored = issuer.lookup_by_id(&record.record_id).await.unwrap().unwrap();
        assert_eq!(stored.revocation(), a.revocation());
        assert_eq!(
            audit
                .events()
                .await
                .iter()
                .filter(|e| e.action == AuditAction::Revoked)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = Arc::new(SlowStore {
            inner: InMemoryRecordStore::new(),
            delay: Duration::from_millis(300),
        });
        let issuer = CertificateIssuer::new(store, Arc::new(AuditLog::new()), Duration::from_millis(20));

        let err = issuer
            .issue(fingerprint(b"doc").as_str(), "univ-1", "alice", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CertificateError::PersistenceTimeout(_)));
        assert!(err.is_retryable());

        let err = issuer
            .lookup_by_id(&RecordId::parse("cert-1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CertificateError::PersistenceTimeout(_)));
    }

    #[tokio::test]
    async fn test_cancelled_issue_still_completes() {
        let store = Arc::new(SlowStore {
            inner: InMemoryRecordStore::new(),
            delay: Duration::from_millis(50),
        });
        let issuer = CertificateIssuer::new(store.clone(), Arc::new(AuditLog::new()), Duration::from_secs(2));
        let fp = fingerprint(b"in flight");

        // Caller gives up long before the store write finishes.
        let abandoned = timeout(
            Duration::from_millis(10),
            issuer.issue(fp.as_str(), "univ-1", "alice", Metadata::new()),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.inner.get_by_fingerprint(&fp).await.unwrap().len(), 1);
    }
}
