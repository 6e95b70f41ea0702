//! The operation builder: per-agent chain state and record construction.
//!
//! One builder owns one agent's signing key and one hash chain. `build` is
//! synchronous and performs no I/O; the chain head is advanced under a lock
//! the moment a record is produced, before any attempt to submit it, and is
//! never rewound -- the server derives the same next head from the
//! transmitted fields, so rolling back locally after a failed submission
//! would fork the chain.

use crate::crypto::{PublicKey, SigningKey};
use crate::error::Result;
use crate::hash;
use crate::ident;
use crate::record::{OperationParts, OperationRecord, UnsignedOperation};
use serde_json::Value;
use std::sync::Mutex;

/// Default record lifetime: 30 seconds.
pub const DEFAULT_TTL_MS: u64 = 30_000;

/// Configuration for an [`OperationBuilder`].
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Organization the agent belongs to.
    pub org_id: String,
    /// Registered agent id; also names the on-disk agent directory.
    pub agent_id: String,
    /// Raw 32-byte Ed25519 seed, base64url-encoded.
    pub private_seed: String,
    /// Key id carried in each record. Defaults to an id derived from the
    /// public key fingerprint.
    pub kid: Option<String>,
    /// Record lifetime in milliseconds. Defaults to [`DEFAULT_TTL_MS`].
    pub ttl_ms: Option<u64>,
}

/// Caller-supplied inputs for one operation.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// Caller-defined taxonomy, e.g. `file.edit` or `tool.exec`.
    pub operation_type: String,
    /// What the operation acted on.
    pub subject: Value,
    /// What was done to it.
    pub action: Value,
    /// Arbitrary structured detail; `None` records a `null` payload.
    pub payload: Option<Value>,
}

/// Builds, hashes, and signs operation records for a single agent.
pub struct OperationBuilder {
    org_id: String,
    agent_id: String,
    kid: String,
    ttl_ms: u64,
    key: SigningKey,
    prev_chain_hash: Mutex<String>,
}

impl OperationBuilder {
    /// Create a builder from config, validating the seed by deriving the
    /// public key. The chain head starts at the genesis hash.
    pub fn new(config: BuilderConfig) -> Result<Self> {
        let key = SigningKey::from_b64u(&config.private_seed)?;
        let kid = config
            .kid
            .unwrap_or_else(|| format!("ed25519-{}", key.public_key().fingerprint()));
        Ok(Self {
            org_id: config.org_id,
            agent_id: config.agent_id,
            kid,
            ttl_ms: config.ttl_ms.unwrap_or(DEFAULT_TTL_MS),
            key,
            prev_chain_hash: Mutex::new(hash::genesis_chain_hash()),
        })
    }

    /// Build and sign one operation record, advancing the chain head.
    ///
    /// The lock spans id/nonce/timestamp acquisition through the commit, so
    /// concurrent callers on a shared builder always observe a linear
    /// chain. The head advances even if the caller never submits the
    /// record or the submission later fails.
    pub fn build(&self, request: OperationRequest) -> Result<OperationRecord> {
        let mut head = self
            .prev_chain_hash
            .lock()
            .expect("chain state lock poisoned");

        let parts = OperationParts {
            org_id: self.org_id.clone(),
            agent_id: self.agent_id.clone(),
            agent_pubkey_kid: self.kid.clone(),
            ttl_ms: self.ttl_ms,
            operation_id: ident::operation_id(),
            issued_at: chrono::Utc::now().timestamp_millis(),
            nonce: ident::nonce(),
            operation_type: request.operation_type,
            subject: request.subject,
            action: request.action,
            payload: request.payload.unwrap_or(Value::Null),
        };

        let composed = UnsignedOperation::compose(parts, &head)?;
        let record = composed.record.sign(&self.key)?;

        // Commit: the chain never rewinds past this point.
        *head = composed.chain_hash;

        Ok(record)
    }

    /// The derived Ed25519 public key, for diagnostics and install-time
    /// seed validation.
    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Key id carried in records built by this builder.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Current chain head (the next record's `prev_chain_hash`).
    pub fn prev_chain_hash(&self) -> String {
        self.prev_chain_hash
            .lock()
            .expect("chain state lock poisoned")
            .clone()
    }
}

impl std::fmt::Debug for OperationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationBuilder")
            .field("org_id", &self.org_id)
            .field("agent_id", &self.agent_id)
            .field("kid", &self.kid)
            .field("ttl_ms", &self.ttl_ms)
            .finish_non_exhaustive()
    }
}
