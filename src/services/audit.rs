// src/services/audit.rs
//! Append-only audit trail of certificate mutations.

use crate::models::certificate::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Issued,
    Revoked,
}

/// One effective mutation: what happened, to which record, by whom, when.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub record_id: RecordId,
    pub actor: String,
    pub at: DateTime<Utc>,
    /// Revocation reason, or the recipient for issuance
    pub detail: String,
}

/// In-process audit log, shared between the issuer and the API server.
#[derive(Debug, Default)]
pub struct AuditLog {
    events: RwLock<Vec<AuditEvent>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, event: AuditEvent) {
        self.events.write().await.push(event);
    }

    /// Events in the order they were appended.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    /// Events concerning a single record.
    pub async fn events_for(&self, record_id: &RecordId) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| &e.record_id == record_id)
            .cloned()
            .collect()
    }
}
