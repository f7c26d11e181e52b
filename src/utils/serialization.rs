// src/utils/serialization.rs
//! Serialization utilities.
//!
//! Provides:
//! - JSON encoding of records and snapshots
//! - Base64 transport of document bytes inside JSON request bodies

use crate::error::CertificateError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json;

/// Serializes a value to a pretty-printed JSON string.
pub fn serialize<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(data)
}

/// Deserializes a value from a JSON string.
///
/// # Note
/// The lifetime parameter lets the deserialized value borrow from `data`.
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Decodes a base64-encoded document carried in a JSON body.
///
/// # Errors
/// `ReadFailure` when the payload is not valid base64: the document bytes
/// cannot be recovered, so nothing may be fingerprinted.
pub fn decode_document(encoded: &str) -> Result<Bytes, CertificateError> {
    base64::decode(encoded.trim())
        .map(Bytes::from)
        .map_err(|e| {
            CertificateError::ReadFailure(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("document is not valid base64: {}", e),
            ))
        })
}

/// Encodes document bytes for a JSON body.
pub fn encode_document(document: &[u8]) -> String {
    base64::encode(document)
}
