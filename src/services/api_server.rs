// src/services/api_server.rs
//! API Server for the certificate registry
//!
//! Thin HTTP adapter over the issuer and verifier. Forms, dashboards and other
//! front ends call these endpoints; identities are always explicit request
//! fields, never ambient session state.
//!
//! Endpoints:
//! - Certificate issuance (single and batch), lookup and revocation
//! - Verification by document, record id, or streamed raw document
//! - Audit trail of issuances and revocations

use crate::error::CertificateError;
use crate::models::certificate::{CertificateRecord, Metadata, RecordId};
use crate::models::verification::{Presentation, VerificationOutcome};
use crate::services::audit::{AuditEvent, AuditLog};
use crate::services::credential_issuer::{CertificateIssuer, LookupFilter};
use crate::services::verifier::Verifier;
use crate::utils::crypto::Fingerprint;
use crate::utils::serialization::decode_document;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures::TryStreamExt;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

// API request and response structures

/// Request payload for issuing a certificate
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IssueCertificateRequest {
    /// Base64-encoded credential document
    pub document: String,
    pub issuer: String,
    pub recipient: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Request payload for batch issuance
#[derive(Serialize, Deserialize)]
struct BatchIssueRequest {
    certificates: Vec<IssueCertificateRequest>,
}

/// Response for batch issuance; `failed_at` is the index of the first
/// certificate that could not be issued
#[derive(Serialize, Deserialize)]
struct BatchIssueResponse {
    issued: Vec<CertificateRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Request payload for revoking a certificate
#[derive(Serialize, Deserialize)]
struct RevokeCertificateRequest {
    reason: String,
    revoked_by: String,
}

/// Request payload for verification; at least one field must be present
#[derive(Serialize, Deserialize, Default)]
struct VerifyRequest {
    /// Base64-encoded document
    document: Option<String>,
    record_id: Option<String>,
}

/// Query for fingerprint lookups
#[derive(Deserialize)]
struct FindCertificatesQuery {
    fingerprint: String,
    issuer: Option<String>,
    recipient: Option<String>,
}

/// Query for raw document verification
#[derive(Deserialize)]
struct VerifyDocumentQuery {
    record_id: Option<String>,
}

/// Response containing the audit trail
#[derive(Serialize, Deserialize)]
struct AuditLogResponse {
    events: Vec<AuditEvent>,
}

/// Error wrapper mapping the error taxonomy onto HTTP status codes.
struct ApiError(CertificateError);

impl From<CertificateError> for ApiError {
    fn from(err: CertificateError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            CertificateError::InvalidInput(_) | CertificateError::ReadFailure(_) => StatusCode::BAD_REQUEST,
            CertificateError::NotFound(_) => StatusCode::NOT_FOUND,
            CertificateError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CertificateError::PersistenceTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(json!({ "error": self.0.to_string(), "retryable": self.0.is_retryable() })),
        )
            .into_response()
    }
}

fn parse_record_id(raw: &str) -> Result<RecordId, CertificateError> {
    RecordId::parse(raw).map_err(CertificateError::InvalidInput)
}

/// API server state containing all service dependencies
pub struct ApiServer {
    /// Service for issuing, looking up and revoking certificates
    issuer: Arc<CertificateIssuer>,

    /// Service for verifying presented certificates
    verifier: Arc<Verifier>,

    /// Audit trail shared with the issuer
    audit: Arc<AuditLog>,

    /// Largest accepted document, in bytes
    max_document_bytes: usize,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `issuer` - Certificate lifecycle service
    /// * `verifier` - Verification service
    /// * `audit` - Audit log the issuer appends to
    /// * `max_document_bytes` - Request body cap for raw documents
    pub fn new(
        issuer: CertificateIssuer,
        verifier: Verifier,
        audit: Arc<AuditLog>,
        max_document_bytes: usize,
    ) -> Self {
        ApiServer {
            issuer: Arc::new(issuer),
            verifier: Arc::new(verifier),
            audit,
            max_document_bytes,
        }
    }

    /// Builds the router with all routes and body limits.
    pub fn router(&self) -> Router {
        // Base64 inflates documents by 4/3; leave room for the other JSON fields.
        let json_limit = self.max_document_bytes / 3 * 4 + 64 * 1024;

        let json_routes = Router::new()
            .route(
                "/certificates",
                post(Self::issue_certificate_handler).get(Self::find_certificates_handler),
            )
            .route("/certificates/batch", post(Self::batch_issue_handler))
            .route("/certificates/:record_id", get(Self::get_certificate_handler))
            .route("/certificates/:record_id/revoke", post(Self::revoke_certificate_handler))
            .route("/verify", post(Self::verify_handler))
            .route("/audit-log", get(Self::audit_log_handler))
            .layer(RequestBodyLimitLayer::new(json_limit));

        let raw_routes = Router::new()
            .route("/verify/document", post(Self::verify_document_handler))
            .layer(RequestBodyLimitLayer::new(self.max_document_bytes));

        json_routes
            .merge(raw_routes)
            .layer(ServiceBuilder::new().layer(DefaultBodyLimit::disable()))
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    pub async fn run(&self, addr: SocketAddr) -> io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Certificate registry listening on http://{}", listener.local_addr()?);
        axum::serve(listener, self.router()).await
    }

    // =====================
    // Certificate Handlers
    // =====================

    /// Issues a certificate for an uploaded document
    ///
    /// # Endpoint
    /// POST /certificates
    ///
    /// # Responses
    /// - 201 Created: Returns the new record
    /// - 400 Bad Request: Undecodable document, empty identity
    /// - 500 / 504: Store rejected the write or timed out
    async fn issue_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<IssueCertificateRequest>,
    ) -> Result<impl IntoResponse, ApiError> {
        let record = state.issue_one(payload).await?;
        Ok((StatusCode::CREATED, Json(record)))
    }

    async fn issue_one(&self, payload: IssueCertificateRequest) -> Result<CertificateRecord, CertificateError> {
        let document = decode_document(&payload.document)?;
        self.issuer
            .issue_document(document, &payload.issuer, &payload.recipient, payload.metadata)
            .await
    }

    /// Issues several certificates in order, stopping at the first failure
    ///
    /// # Endpoint
    /// POST /certificates/batch
    ///
    /// # Responses
    /// - 201 Created: All certificates issued
    /// - Error status of the first failure otherwise, with the records issued
    ///   before it
    async fn batch_issue_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<BatchIssueRequest>,
    ) -> impl IntoResponse {
        let mut issued = Vec::with_capacity(payload.certificates.len());

        for (index, request) in payload.certificates.into_iter().enumerate() {
            match state.issue_one(request).await {
                Ok(record) => issued.push(record),
                Err(e) => {
                    let message = e.to_string();
                    let status = ApiError::from(e).status();
                    if status.is_server_error() {
                        error!("Batch issuance failed at certificate {}: {}", index, message);
                    }
                    info!("Batch issuance stopped at {} after {} certificates", index, issued.len());
                    let response = BatchIssueResponse {
                        issued,
                        failed_at: Some(index),
                        error: Some(message),
                    };
                    return (status, Json(response));
                }
            }
        }

        (
            StatusCode::CREATED,
            Json(BatchIssueResponse {
                issued,
                failed_at: None,
                error: None,
            }),
        )
    }

    /// Looks a certificate up by record id
    ///
    /// # Endpoint
    /// GET /certificates/:record_id
    async fn get_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Path(record_id): Path<String>,
    ) -> Result<Json<CertificateRecord>, ApiError> {
        let record_id = parse_record_id(&record_id)?;
        let record = state
            .issuer
            .lookup_by_id(&record_id)
            .await?
            .ok_or(CertificateError::NotFound(record_id))?;
        Ok(Json(record))
    }

    /// Lists every certificate issued for a fingerprint
    ///
    /// # Endpoint
    /// GET /certificates?fingerprint=...&issuer=...&recipient=...
    async fn find_certificates_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<FindCertificatesQuery>,
    ) -> Result<Json<Vec<CertificateRecord>>, ApiError> {
        let fingerprint = Fingerprint::parse(&query.fingerprint).map_err(CertificateError::InvalidInput)?;
        let filter = LookupFilter {
            issuer: query.issuer,
            recipient: query.recipient,
        };
        let records = state.issuer.lookup_by_fingerprint(&fingerprint, &filter).await?;
        Ok(Json(records))
    }

    /// Revokes a certificate
    ///
    /// # Endpoint
    /// POST /certificates/:record_id/revoke
    ///
    /// # Responses
    /// - 200 OK: Revoked record (the existing revocation if already revoked)
    /// - 404 Not Found: Unknown record id
    async fn revoke_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Path(record_id): Path<String>,
        Json(payload): Json<RevokeCertificateRequest>,
    ) -> Result<Json<CertificateRecord>, ApiError> {
        let record = state
            .issuer
            .revoke(&record_id, &payload.reason, &payload.revoked_by)
            .await?;
        Ok(Json(record))
    }

    // =====================
    // Verification Handlers
    // =====================

    /// Verifies a base64 document, a record id, or both
    ///
    /// # Endpoint
    /// POST /verify
    ///
    /// # Responses
    /// - 200 OK: Verification outcome (including `tampered` and `not_found`)
    /// - 400 Bad Request: Neither field present, or undecodable document
    async fn verify_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<VerifyRequest>,
    ) -> Result<Json<VerificationOutcome>, ApiError> {
        let presentation = match (payload.document, payload.record_id) {
            (Some(document), Some(record_id)) => Presentation::DocumentForRecord {
                document: decode_document(&document)?,
                record_id: parse_record_id(&record_id)?,
            },
            (Some(document), None) => Presentation::Document(decode_document(&document)?),
            (None, Some(record_id)) => Presentation::RecordId(parse_record_id(&record_id)?),
            (None, None) => {
                return Err(CertificateError::InvalidInput(
                    "either document or record_id is required".into(),
                )
                .into())
            }
        };
        Ok(Json(state.verifier.verify(presentation).await?))
    }

    /// Verifies a raw document body, hashed while it streams in
    ///
    /// # Endpoint
    /// POST /verify/document?record_id=...
    async fn verify_document_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<VerifyDocumentQuery>,
        body: Body,
    ) -> Result<Json<VerificationOutcome>, ApiError> {
        let claimed = query.record_id.as_deref().map(parse_record_id).transpose()?;
        let chunks = body
            .into_data_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        Ok(Json(state.verifier.verify_stream(chunks, claimed).await?))
    }

    // =====================
    // Audit
    // =====================

    /// Returns every recorded issuance and revocation
    ///
    /// # Endpoint
    /// GET /audit-log
    async fn audit_log_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        Json(AuditLogResponse {
            events: state.audit.events().await,
        })
    }
}

// Implement Clone for ApiServer to use with Axum's State
impl Clone for ApiServer {
    fn clone(&self) -> Self {
        ApiServer {
            issuer: Arc::clone(&self.issuer),
            verifier: Arc::clone(&self.verifier),
            audit: Arc::clone(&self.audit),
            max_document_bytes: self.max_document_bytes,
        }
    }
}
