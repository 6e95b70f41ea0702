//! Content hashing for operation records.
//!
//! All digests are SHA-256 rendered as unpadded base64url (43 characters).
//! Payload hashes are computed over canonical JSON bytes, so two
//! structurally equal payloads always hash identically regardless of key
//! insertion order.

use crate::codec;
use crate::error::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 over raw bytes, base64url-encoded without padding.
pub fn sha256_b64u(data: &[u8]) -> String {
    codec::b64u_encode(Sha256::digest(data))
}

/// Digest of a payload's canonical JSON form.
///
/// A `null` payload hashes the literal four-byte text `null`.
pub fn payload_hash(value: &Value) -> Result<String> {
    Ok(sha256_b64u(&codec::canonical_bytes(value)?))
}

/// The chain head before any operation: SHA-256 of 32 zero bytes.
pub fn genesis_chain_hash() -> String {
    sha256_b64u(&[0u8; 32])
}

/// Digest binding an operation to its predecessor in the agent's stream.
///
/// The preimage is the `|`-joined previous head, payload hash, operation id,
/// and decimal issue timestamp; the server recomputes the same value from
/// the transmitted fields.
pub fn chain_hash(
    prev_chain_hash: &str,
    payload_hash: &str,
    operation_id: &str,
    issued_at: i64,
) -> String {
    let preimage = format!(
        "{}|{}|{}|{}",
        prev_chain_hash, payload_hash, operation_id, issued_at
    );
    sha256_b64u(preimage.as_bytes())
}
