// src/utils/crypto.rs
//! Document fingerprinting.
//!
//! Uses SHA-512 (via `ring`) for every fingerprint. Digests are carried as
//! lowercase hex strings of 128 characters so they can be compared, indexed and
//! serialized without further encoding.

use crate::error::CertificateError;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use ring::digest::{Context, SHA512, SHA512_OUTPUT_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use tokio::task;

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_HEX_LEN: usize = SHA512_OUTPUT_LEN * 2;

/// Documents larger than this are hashed on the blocking thread pool.
const INLINE_HASH_LIMIT: usize = 1024 * 1024;

/// A SHA-512 document fingerprint.
///
/// Always exactly [`FINGERPRINT_HEX_LEN`] lowercase hex characters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parses a caller-supplied digest string.
    ///
    /// Uppercase hex is rejected rather than normalised: two spellings of the
    /// same digest would otherwise index differently in a store.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.len() != FINGERPRINT_HEX_LEN {
            return Err(format!(
                "fingerprint must be {} hex characters, got {}",
                FINGERPRINT_HEX_LEN,
                raw.len()
            ));
        }
        if !raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err("fingerprint must be lowercase hexadecimal".into());
        }
        Ok(Fingerprint(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_digest(digest: &[u8]) -> Self {
        Fingerprint(hex::encode(digest))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Fingerprint::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// Computes the SHA-512 fingerprint of an in-memory document.
///
/// # Example
/// ```
/// use cert_registry::utils::crypto::fingerprint;
///
/// let a = fingerprint(b"transcript");
/// assert_eq!(a, fingerprint(b"transcript"));
/// assert_eq!(a.as_str().len(), 128);
/// ```
pub fn fingerprint(document: &[u8]) -> Fingerprint {
    let mut ctx = Context::new(&SHA512);
    ctx.update(document);
    Fingerprint::from_digest(ctx.finish().as_ref())
}

/// Fingerprints an owned document, moving large inputs off the async worker
/// threads.
pub async fn fingerprint_owned(document: Bytes) -> Result<Fingerprint, CertificateError> {
    if document.len() <= INLINE_HASH_LIMIT {
        return Ok(fingerprint(&document));
    }
    task::spawn_blocking(move || fingerprint(&document))
        .await
        .map_err(|e| CertificateError::ReadFailure(io::Error::new(io::ErrorKind::Other, e)))
}

/// Fingerprints a chunked byte source.
///
/// Any error from the source aborts hashing with `ReadFailure`; a digest of a
/// partially consumed document is never returned.
pub async fn fingerprint_stream<S>(chunks: S) -> Result<Fingerprint, CertificateError>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut ctx = Context::new(&SHA512);
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(CertificateError::ReadFailure)?;
        ctx.update(&chunk);
    }
    Ok(Fingerprint::from_digest(ctx.finish().as_ref()))
}
