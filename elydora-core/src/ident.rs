//! Operation identifiers and nonces.
//!
//! Operation ids are UUIDv7 (RFC 9562): a 48-bit unix-millisecond prefix
//! followed by version/variant bits and 74 random bits, rendered in the
//! canonical lowercase hyphenated form. Time-ordering across milliseconds
//! comes from the prefix; within one millisecond ids are random and the
//! chain hash, not id order, carries the stream ordering.

use crate::codec::b64u_encode;
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

/// Nonce length in bytes (22 base64url characters).
pub const NONCE_LEN: usize = 16;

/// A fresh time-ordered operation id.
pub fn operation_id() -> String {
    Uuid::now_v7().to_string()
}

/// A fresh 16-byte nonce, base64url-encoded. Never reused.
pub fn nonce() -> String {
    let mut bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut bytes);
    b64u_encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_is_canonical_uuidv7() {
        let id = operation_id();
        assert_eq!(id.len(), 36);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
        // variant bits are 10xx
        assert_eq!(parsed.as_bytes()[8] >> 6, 0b10);
    }

    #[test]
    fn test_operation_id_timestamp_tracks_wall_clock() {
        let before = chrono::Utc::now().timestamp_millis();
        let id = operation_id();
        let after = chrono::Utc::now().timestamp_millis();

        let bytes = *Uuid::parse_str(&id).unwrap().as_bytes();
        let mut ts: i64 = 0;
        for b in &bytes[..6] {
            ts = (ts << 8) | i64::from(*b);
        }
        assert!(ts >= before - 1 && ts <= after + 1, "timestamp {} outside [{}, {}]", ts, before, after);
    }

    #[test]
    fn test_nonce_length_and_freshness() {
        let a = nonce();
        let b = nonce();
        assert_eq!(a.len(), 22);
        assert_eq!(b.len(), 22);
        assert_ne!(a, b);
    }
}
