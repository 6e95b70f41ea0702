//! High-level client: one agent's builder and transport behind a single
//! configuration record.
//!
//! Most integrations only need [`Client::create_operation`] followed by
//! [`Client::submit_operation`]; the underlying [`OperationBuilder`] and
//! [`Transport`] stay reachable for diagnostics and read-only queries.

use crate::builder::{BuilderConfig, OperationBuilder, OperationRequest};
use crate::crypto::PublicKey;
use crate::error::Result;
use crate::record::{OperationRecord, Receipt};
use crate::transport::{Transport, TransportConfig};
use std::time::Duration;

/// The full client configuration record.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub org_id: String,
    pub agent_id: String,
    /// Raw 32-byte Ed25519 seed, base64url-encoded.
    pub private_seed: String,
    /// Platform endpoint; defaults to the production base URL.
    pub base_url: Option<String>,
    /// Record lifetime in milliseconds; defaults to 30 000.
    pub ttl_ms: Option<u64>,
    /// Retry budget on top of the first attempt; defaults to 3.
    pub max_retries: Option<u32>,
    /// Key id carried in records; defaults to a fingerprint-derived id.
    pub kid: Option<String>,
    /// Bearer token, when already authenticated.
    pub token: Option<String>,
    /// Per-attempt timeout; defaults to 30 s.
    pub timeout: Option<Duration>,
}

impl ClientOptions {
    /// Options with every default, for the common three-field case.
    pub fn new(
        org_id: impl Into<String>,
        agent_id: impl Into<String>,
        private_seed: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            agent_id: agent_id.into(),
            private_seed: private_seed.into(),
            base_url: None,
            ttl_ms: None,
            max_retries: None,
            kid: None,
            token: None,
            timeout: None,
        }
    }
}

/// One agent's signing pipeline plus its platform connection.
#[derive(Debug)]
pub struct Client {
    builder: OperationBuilder,
    transport: Transport,
}

impl Client {
    /// Validate the seed, derive the key id, and set up the transport.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let builder = OperationBuilder::new(BuilderConfig {
            org_id: options.org_id,
            agent_id: options.agent_id,
            private_seed: options.private_seed,
            kid: options.kid,
            ttl_ms: options.ttl_ms,
        })?;
        let transport = Transport::new(TransportConfig {
            base_url: options.base_url,
            token: options.token,
            max_retries: options.max_retries,
            timeout: options.timeout,
        })?;
        Ok(Self { builder, transport })
    }

    /// Build and sign one operation record. Synchronous; advances the
    /// chain head whether or not the record is ever submitted.
    pub fn create_operation(&self, request: OperationRequest) -> Result<OperationRecord> {
        self.builder.build(request)
    }

    /// Submit a previously built record. Records must be submitted in the
    /// order they were built; reordering forks the server-side chain.
    pub async fn submit_operation(&self, record: &OperationRecord) -> Result<Receipt> {
        self.transport.submit_operation(record).await
    }

    /// The hot path: build, sign, and submit in one call.
    pub async fn record_operation(
        &self,
        request: OperationRequest,
    ) -> Result<(OperationRecord, Receipt)> {
        let record = self.create_operation(request)?;
        let receipt = self.submit_operation(&record).await?;
        Ok((record, receipt))
    }

    /// The derived Ed25519 public key.
    pub fn public_key(&self) -> PublicKey {
        self.builder.public_key()
    }

    /// The underlying builder (chain head, key id).
    pub fn builder(&self) -> &OperationBuilder {
        &self.builder
    }

    /// The underlying transport, for read-only queries.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}
