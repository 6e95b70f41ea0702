//! Operation records: the signed envelope describing one agent action.
//!
//! An operation record binds an arbitrary structured payload to an agent's
//! identity, a fresh id and nonce, a content hash, and the previous head of
//! the agent's hash chain. The signature covers the canonical JSON of the
//! envelope minus the `signature` field; the chain hash is computed locally
//! but never transmitted -- the server recomputes it from the transmitted
//! fields.

use crate::codec;
use crate::crypto::{PublicKey, SigningKey};
use crate::error::{Error, Result};
use crate::hash;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope schema version carried in every record.
pub const OP_VERSION: &str = "1.0";

/// Fully explicit inputs for composing an unsigned record.
///
/// The operation builder fills identity and freshness fields itself;
/// deterministic fixtures supply every part verbatim.
#[derive(Debug, Clone)]
pub struct OperationParts {
    pub org_id: String,
    pub agent_id: String,
    pub agent_pubkey_kid: String,
    pub ttl_ms: u64,
    pub operation_id: String,
    pub issued_at: i64,
    pub nonce: String,
    pub operation_type: String,
    pub subject: Value,
    pub action: Value,
    pub payload: Value,
}

/// An operation record before signing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsignedOperation {
    pub op_version: String,
    pub operation_id: String,
    pub org_id: String,
    pub agent_id: String,
    pub issued_at: i64,
    pub ttl_ms: u64,
    pub nonce: String,
    pub operation_type: String,
    pub subject: Value,
    pub action: Value,
    pub payload: Value,
    pub payload_hash: String,
    pub prev_chain_hash: String,
    pub agent_pubkey_kid: String,
}

/// An unsigned record together with the chain hash its build produced.
///
/// The chain hash is the caller's next `prev_chain_hash`; it is not part
/// of the envelope.
#[derive(Debug, Clone)]
pub struct ComposedOperation {
    pub record: UnsignedOperation,
    pub chain_hash: String,
}

impl UnsignedOperation {
    /// Assemble an unsigned record from explicit parts, hashing the payload
    /// and deriving the chain hash that commits this record to the stream.
    pub fn compose(parts: OperationParts, prev_chain_hash: &str) -> Result<ComposedOperation> {
        let payload_hash = hash::payload_hash(&parts.payload)?;
        let chain_hash = hash::chain_hash(
            prev_chain_hash,
            &payload_hash,
            &parts.operation_id,
            parts.issued_at,
        );
        let record = UnsignedOperation {
            op_version: OP_VERSION.to_string(),
            operation_id: parts.operation_id,
            org_id: parts.org_id,
            agent_id: parts.agent_id,
            issued_at: parts.issued_at,
            ttl_ms: parts.ttl_ms,
            nonce: parts.nonce,
            operation_type: parts.operation_type,
            subject: parts.subject,
            action: parts.action,
            payload: parts.payload,
            payload_hash,
            prev_chain_hash: prev_chain_hash.to_string(),
            agent_pubkey_kid: parts.agent_pubkey_kid,
        };
        Ok(ComposedOperation { record, chain_hash })
    }

    /// The canonical bytes the signature is computed over.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let value = serde_json::to_value(self)
            .map_err(|e| Error::validation(format!("unserializable record: {}", e)))?;
        codec::canonical_bytes(&value)
    }

    /// Sign the envelope, producing the wire-ready record.
    pub fn sign(self, key: &SigningKey) -> Result<OperationRecord> {
        let signature = key.sign(&self.signing_bytes()?);
        Ok(OperationRecord {
            op_version: self.op_version,
            operation_id: self.operation_id,
            org_id: self.org_id,
            agent_id: self.agent_id,
            issued_at: self.issued_at,
            ttl_ms: self.ttl_ms,
            nonce: self.nonce,
            operation_type: self.operation_type,
            subject: self.subject,
            action: self.action,
            payload: self.payload,
            payload_hash: self.payload_hash,
            prev_chain_hash: self.prev_chain_hash,
            agent_pubkey_kid: self.agent_pubkey_kid,
            signature,
        })
    }
}

/// A signed operation record, ready for submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub op_version: String,
    pub operation_id: String,
    pub org_id: String,
    pub agent_id: String,
    pub issued_at: i64,
    pub ttl_ms: u64,
    pub nonce: String,
    pub operation_type: String,
    pub subject: Value,
    pub action: Value,
    pub payload: Value,
    pub payload_hash: String,
    pub prev_chain_hash: String,
    pub agent_pubkey_kid: String,
    pub signature: String,
}

impl OperationRecord {
    /// The canonical form of the full signed envelope, as submitted.
    pub fn canonical_json(&self) -> Result<String> {
        let value = serde_json::to_value(self)
            .map_err(|e| Error::validation(format!("unserializable record: {}", e)))?;
        codec::to_canonical_json(&value)
    }

    /// Re-canonicalize the envelope minus `signature` and verify Ed25519.
    pub fn verify(&self, key: &PublicKey) -> Result<()> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| Error::validation(format!("unserializable record: {}", e)))?;
        let map = value
            .as_object_mut()
            .ok_or_else(|| Error::validation("record did not serialize to an object"))?;
        map.remove("signature");
        let message = codec::canonical_bytes(&value)?;
        key.verify(&message, &self.signature)
    }
}

/// Server-issued audit receipt acknowledging one operation.
///
/// Consumed, never constructed, by this SDK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub receipt_id: String,
    pub operation_id: String,
    pub seq_no: u64,
    pub chain_hash: String,
    pub server_received_at: i64,
    pub queue_message_id: String,
    pub receipt_hash: String,
    pub elydora_kid: String,
    pub elydora_signature: String,
    pub receipt_version: String,
}
