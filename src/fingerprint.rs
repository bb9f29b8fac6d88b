//! Content fingerprinting for cache keys and batch deduplication.
//!
//! A fingerprint is the SHA-256 of the raw document bytes, base64-encoded.
//! Extraction is assumed idempotent for a given payload, so identical bytes
//! always map to the same cache slot.

use base64::Engine;
use sha2::{Digest, Sha256};

/// Compute the content fingerprint for a document payload.
pub fn fingerprint(payload: &[u8]) -> String {
    let hash = Sha256::digest(payload);
    base64::engine::general_purpose::STANDARD.encode(hash)
}
