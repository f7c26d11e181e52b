// src/main.rs

//! # Certificate Registry - Main Entry Point
//!
//! Loads configuration, opens the record store and starts the API server.
//!
//! ## Environment Variables
//! - `CERTD_BIND_ADDR`: (Optional) listen address (default: 127.0.0.1:3000)
//! - `CERTD_STORE_TIMEOUT_MS`: (Optional) per-call store deadline (default: 5000)
//! - `CERTD_MAX_DOCUMENT_BYTES`: (Optional) request body cap (default: 10 MiB)
//! - `CERTD_STORE_PATH`: (Optional) JSON snapshot file; records are kept in
//!   memory only when unset
//! - `RUST_LOG`: (Optional) log filter (default: info)

use anyhow::Context;
use cert_registry::config::Settings;
use cert_registry::services::api_server::ApiServer;
use cert_registry::services::audit::AuditLog;
use cert_registry::storage::{InMemoryRecordStore, JsonFileRecordStore, RecordStore};
use cert_registry::{CertificateIssuer, Verifier};
use dotenv::dotenv;
use log::{info, warn};
use std::sync::Arc;

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load `.env` and settings
/// 2. Open the record store
/// 3. Wire issuer, verifier and audit log
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("invalid CERTD_* configuration")?;

    let store: Arc<dyn RecordStore> = match &settings.store_path {
        Some(path) => Arc::new(
            JsonFileRecordStore::open(path)
                .await
                .with_context(|| format!("failed to open record store at {}", path.display()))?,
        ),
        None => {
            warn!("CERTD_STORE_PATH not set, records will not survive a restart");
            Arc::new(InMemoryRecordStore::new())
        }
    };

    let audit = Arc::new(AuditLog::new());
    let issuer = CertificateIssuer::new(store, Arc::clone(&audit), settings.store_timeout());
    let verifier = Verifier::new(issuer.clone());
    let api_server = ApiServer::new(issuer, verifier, audit, settings.max_document_bytes);

    info!("Available endpoints:");
    info!("- POST /certificates");
    info!("- POST /certificates/batch");
    info!("- GET  /certificates/:record_id");
    info!("- GET  /certificates?fingerprint=...");
    info!("- POST /certificates/:record_id/revoke");
    info!("- POST /verify");
    info!("- POST /verify/document");
    info!("- GET  /audit-log");

    api_server
        .run(settings.bind_addr)
        .await
        .context("API server stopped")
}
