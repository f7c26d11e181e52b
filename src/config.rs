// src/config.rs
//! Runtime settings.
//!
//! Values come from built-in defaults, overridden by `CERTD_*` environment
//! variables (a `.env` file is loaded first by the binary):
//! - `CERTD_BIND_ADDR`: socket address for the HTTP API
//! - `CERTD_STORE_TIMEOUT_MS`: deadline for each record store call
//! - `CERTD_MAX_DOCUMENT_BYTES`: largest accepted request body
//! - `CERTD_STORE_PATH`: (optional) JSON snapshot file; in-memory when unset

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "CERTD";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub store_timeout_ms: u64,
    pub max_document_bytes: usize,
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl Settings {
    /// Loads settings from defaults and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()
    }

    /// Builder pre-populated with defaults; extra sources layer on top.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("bind_addr", "127.0.0.1:3000")?
            .set_default("store_timeout_ms", 5_000_i64)?
            .set_default("max_document_bytes", 10 * 1024 * 1024_i64)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
