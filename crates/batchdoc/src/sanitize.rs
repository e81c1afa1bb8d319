//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Object names can carry customer folder structure, so spans only ever see
//! the base name or a short correlation hash.

use sha2::{Digest, Sha256};

/// Returns only the base name of an object (no folder prefix).
pub fn redact_object_name(object_name: &str) -> String {
    match object_name.trim_end_matches('/').rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "<unknown>".to_string(),
    }
}

/// Short deterministic hash of a prefix for correlating log lines without
/// exposing the folder name.
pub fn hash_prefix(prefix: &str) -> String {
    let digest = Sha256::digest(prefix.as_bytes());
    hex::encode(&digest[..8])
}
