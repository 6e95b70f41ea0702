//! # Elydora Core
//!
//! Client SDK for the Elydora tamper-evident audit platform.
//!
//! Elydora records the operations performed by AI coding agents as signed,
//! hash-chained envelopes a remote verifier can later prove three things
//! about: authenticity (Ed25519 over canonical bytes), payload integrity
//! (RFC 8785 canonical hash), and append-only ordering per agent (hash
//! chain).
//!
//! ## Key Concepts
//!
//! - **Operation record**: the signed envelope describing one agent action
//! - **Chain hash**: digest binding each record to its predecessor; the
//!   head starts at the genesis hash and never rewinds
//! - **Receipt**: the server's signed acknowledgement, carrying the
//!   assigned sequence number
//!
//! ## Example
//!
//! ```rust,ignore
//! use elydora_core::{OperationBuilder, BuilderConfig, OperationRequest, Transport, TransportConfig};
//! use serde_json::json;
//!
//! let builder = OperationBuilder::new(BuilderConfig {
//!     org_id: "org_123".into(),
//!     agent_id: "agent_7".into(),
//!     private_seed: seed_from_install,
//!     kid: None,
//!     ttl_ms: None,
//! })?;
//!
//! let record = builder.build(OperationRequest {
//!     operation_type: "file.edit".into(),
//!     subject: json!({"path": "src/main.rs"}),
//!     action: json!({"kind": "write"}),
//!     payload: Some(json!({"bytes": 120})),
//! })?;
//!
//! let transport = Transport::new(TransportConfig::default())?;
//! let receipt = transport.submit_operation(&record).await?;
//! ```

pub mod builder;
pub mod client;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod ident;
pub mod record;
pub mod transport;

pub use builder::{BuilderConfig, OperationBuilder, OperationRequest, DEFAULT_TTL_MS};
pub use client::{Client, ClientOptions};
pub use crypto::{PublicKey, SigningKey};
pub use error::{Error, ErrorCode, Result};
pub use record::{
    ComposedOperation, OperationParts, OperationRecord, Receipt, UnsignedOperation, OP_VERSION,
};
pub use transport::{
    AuditPage, AuditQuery, AuthResponse, Transport, TransportConfig, DEFAULT_BASE_URL,
    DEFAULT_MAX_RETRIES,
};
