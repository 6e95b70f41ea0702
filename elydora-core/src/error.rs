//! Error types for the Elydora SDK.
//!
//! Every error carries the HTTP status it originated from (`0` for errors
//! raised locally, before any request was made), a stable wire code, a
//! human-readable message, and the server's request id when one exists.
//! Server-issued errors are parsed from the platform's error envelope and
//! re-raised as-is; they are never retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes shared with the platform.
///
/// The serialized form is the wire value (`INVALID_SIGNATURE`, ...); codes
/// the client does not recognize are mapped to [`ErrorCode::InternalError`]
/// with the server's original message preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Signature failed verification at the server.
    InvalidSignature,
    /// Agent id not registered.
    UnknownAgent,
    /// Signing key has been revoked.
    KeyRevoked,
    /// Agent is in the frozen state.
    AgentFrozen,
    /// `issued_at + ttl_ms` is in the server's past.
    TtlExpired,
    /// `(agent_id, nonce)` or `operation_id` reused.
    ReplayDetected,
    /// Submitted `prev_chain_hash` does not match server state.
    PrevHashMismatch,
    /// Payload exceeds the server limit.
    PayloadTooLarge,
    /// HTTP 429 surfaced after exhausted retries.
    RateLimited,
    /// Missing or invalid token.
    Unauthorized,
    /// Authenticated but not permitted.
    Forbidden,
    /// Resource does not exist.
    NotFound,
    /// Malformed input, including local codec/signer validation.
    ValidationError,
    /// Unparseable or unexpected server response.
    InternalError,
}

impl ErrorCode {
    /// The stable wire string for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::UnknownAgent => "UNKNOWN_AGENT",
            ErrorCode::KeyRevoked => "KEY_REVOKED",
            ErrorCode::AgentFrozen => "AGENT_FROZEN",
            ErrorCode::TtlExpired => "TTL_EXPIRED",
            ErrorCode::ReplayDetected => "REPLAY_DETECTED",
            ErrorCode::PrevHashMismatch => "PREV_HASH_MISMATCH",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Parse a wire string into a known code.
    pub fn from_wire(s: &str) -> Option<Self> {
        Some(match s {
            "INVALID_SIGNATURE" => ErrorCode::InvalidSignature,
            "UNKNOWN_AGENT" => ErrorCode::UnknownAgent,
            "KEY_REVOKED" => ErrorCode::KeyRevoked,
            "AGENT_FROZEN" => ErrorCode::AgentFrozen,
            "TTL_EXPIRED" => ErrorCode::TtlExpired,
            "REPLAY_DETECTED" => ErrorCode::ReplayDetected,
            "PREV_HASH_MISMATCH" => ErrorCode::PrevHashMismatch,
            "PAYLOAD_TOO_LARGE" => ErrorCode::PayloadTooLarge,
            "RATE_LIMITED" => ErrorCode::RateLimited,
            "UNAUTHORIZED" => ErrorCode::Unauthorized,
            "FORBIDDEN" => ErrorCode::Forbidden,
            "NOT_FOUND" => ErrorCode::NotFound,
            "VALIDATION_ERROR" => ErrorCode::ValidationError,
            "INTERNAL_ERROR" => ErrorCode::InternalError,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by the SDK, locally or relayed from the platform.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message} (status {status}, request {request_id})")]
pub struct Error {
    /// Originating HTTP status; `0` for errors raised before any request.
    pub status: u16,
    /// Stable wire code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Server request id; `"local"` for client-side errors, `"unknown"`
    /// when the server response carried none.
    pub request_id: String,
    /// Structured detail object, when the server provided one.
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// A local validation failure (malformed seed, bad base64url,
    /// non-finite number, ...). Raised before any network traffic.
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            code: ErrorCode::ValidationError,
            message: message.into(),
            request_id: "local".to_string(),
            details: None,
        }
    }

    /// A transport-level failure (connection, DNS, TLS, timeout) that
    /// survived the retry budget.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            code: ErrorCode::InternalError,
            message: message.into(),
            request_id: "local".to_string(),
            details: None,
        }
    }

    /// An error relayed from the platform's error envelope.
    pub fn api(
        status: u16,
        code: ErrorCode,
        message: impl Into<String>,
        request_id: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            request_id: request_id.into(),
            details,
        }
    }

    /// True when the error was raised locally rather than by the server.
    pub fn is_local(&self) -> bool {
        self.status == 0
    }
}
