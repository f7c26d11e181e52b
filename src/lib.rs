// src/lib.rs

//! # Certificate Registry
//!
//! Content-addressed integrity for academic certificates: a document is
//! fingerprinted with SHA-512, the fingerprint is bound to an immutable
//! issuance record, and presented documents or record ids are later checked
//! against that record.
//!
//! ## Architecture Overview
//! 1. **Fingerprinting**: [`utils::crypto`], pure SHA-512 over bytes or streams
//! 2. **Storage Layer**: [`storage::RecordStore`] with in-memory and JSON
//!    snapshot implementations
//! 3. **Services Layer**: issuance/revocation ([`services::credential_issuer`]),
//!    verification ([`services::verifier`]) and the HTTP API
//!    ([`services::api_server`])

pub mod config;
pub mod error;
pub mod models;    // Data structures
pub mod services;  // Lifecycle, verification and API
pub mod storage;   // Record stores
pub mod utils;     // Fingerprinting and serialization helpers

pub use error::{CertificateError, StoreError};
pub use models::certificate::{CertificateRecord, CertificateStatus, Metadata, RecordId, Revocation};
pub use models::verification::{Outcome, Presentation, VerificationOutcome};
pub use services::credential_issuer::{CertificateIssuer, LookupFilter};
pub use services::verifier::Verifier;
pub use utils::crypto::{fingerprint, Fingerprint};
