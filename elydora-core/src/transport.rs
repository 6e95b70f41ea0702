//! Authenticated HTTPS transport for the Elydora platform.
//!
//! Submits signed operation records and performs read-only queries. All
//! requests carry `Accept: application/json`, a bearer token once one is
//! set, and `Content-Type: application/json` when a body is present.
//!
//! Transport errors and HTTP 429/5xx responses are retried with bounded
//! exponential backoff (honoring integer `Retry-After` seconds); other 4xx
//! responses and already-typed platform errors are never retried. The
//! underlying `reqwest` client pools connections and is safe to share
//! across tasks; every await point is tokio-cancellable.

use crate::error::{Error, ErrorCode, Result};
use crate::record::{OperationRecord, Receipt};
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Default platform endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.elydora.com";

/// Default retry budget: 1 initial attempt + 3 retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Backoff ceiling between attempts.
const MAX_BACKOFF_MS: u64 = 10_000;

/// Configuration for a [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Platform base URL; trailing slashes are stripped.
    pub base_url: Option<String>,
    /// Bearer token, when already authenticated.
    pub token: Option<String>,
    /// Retry budget on top of the first attempt.
    pub max_retries: Option<u32>,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
}

/// HTTP client for the platform API.
#[derive(Debug, Clone)]
pub struct Transport {
    http: Client,
    base_url: Url,
    token: Option<String>,
    max_retries: u32,
}

impl Transport {
    /// Build a transport from config.
    pub fn new(config: TransportConfig) -> Result<Self> {
        let raw = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let trimmed = raw.trim_end_matches('/');
        let base_url = Url::parse(trimmed)
            .map_err(|e| Error::validation(format!("invalid base URL {:?}: {}", trimmed, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::validation(format!(
                "base URL {:?} cannot carry paths",
                trimmed
            )));
        }
        let http = Client::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| Error::transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            token: config.token,
            max_retries: config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        })
    }

    /// Install the bearer token returned by login or registration.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------

    /// `POST /v1/auth/register`
    pub async fn register_user(&self, req: &RegisterUserRequest) -> Result<AuthResponse> {
        self.post_json(&["v1", "auth", "register"], req).await
    }

    /// `POST /v1/auth/login`
    pub async fn login(&self, req: &LoginRequest) -> Result<AuthResponse> {
        self.post_json(&["v1", "auth", "login"], req).await
    }

    // ------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------

    /// `POST /v1/agents/register`
    pub async fn register_agent(&self, req: &RegisterAgentRequest) -> Result<AgentDetail> {
        self.post_json(&["v1", "agents", "register"], req).await
    }

    /// `GET /v1/agents/{id}`
    pub async fn get_agent(&self, agent_id: &str) -> Result<AgentDetail> {
        self.get_json(&["v1", "agents", agent_id]).await
    }

    /// `POST /v1/agents/{id}/freeze` -- 204 on success.
    pub async fn freeze_agent(&self, agent_id: &str, reason: &str) -> Result<()> {
        let body = serde_json::json!({ "reason": reason });
        self.post_empty(&["v1", "agents", agent_id, "freeze"], &body)
            .await
    }

    /// `POST /v1/agents/{id}/revoke` -- 204 on success.
    pub async fn revoke_key(&self, agent_id: &str, kid: &str, reason: &str) -> Result<()> {
        let body = serde_json::json!({ "kid": kid, "reason": reason });
        self.post_empty(&["v1", "agents", agent_id, "revoke"], &body)
            .await
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// `POST /v1/operations` -- submit a signed record, returning the
    /// server's receipt.
    ///
    /// The body is the record's canonical JSON form, byte-identical to the
    /// bytes the signature covers plus the `signature` field.
    pub async fn submit_operation(&self, record: &OperationRecord) -> Result<Receipt> {
        let url = self.endpoint(&["v1", "operations"])?;
        let body = record.canonical_json()?;
        let response = self.execute(Method::POST, url, Some(body)).await?;
        let envelope: ReceiptEnvelope = Self::decode_json(response).await?;
        Ok(envelope.receipt)
    }

    /// `GET /v1/operations/{id}`
    pub async fn get_operation(&self, operation_id: &str) -> Result<OperationDetail> {
        self.get_json(&["v1", "operations", operation_id]).await
    }

    /// `POST /v1/operations/{id}/verify` -- ask the platform to re-verify
    /// a stored record.
    pub async fn verify_operation(&self, operation_id: &str) -> Result<Value> {
        let url = self.endpoint(&["v1", "operations", operation_id, "verify"])?;
        let response = self.execute(Method::POST, url, None).await?;
        Self::decode_json(response).await
    }

    /// `POST /v1/audit/query`
    pub async fn query_audit_log(&self, query: &AuditQuery) -> Result<AuditPage> {
        self.post_json(&["v1", "audit", "query"], query).await
    }

    // ------------------------------------------------------------------
    // Epochs & exports
    // ------------------------------------------------------------------

    /// `GET /v1/epochs`
    pub async fn list_epochs(&self) -> Result<Vec<Value>> {
        let envelope: EpochsEnvelope = self.get_json(&["v1", "epochs"]).await?;
        Ok(envelope.epochs)
    }

    /// `GET /v1/epochs/{id}`
    pub async fn get_epoch(&self, epoch_id: &str) -> Result<EpochDetail> {
        self.get_json(&["v1", "epochs", epoch_id]).await
    }

    /// `POST /v1/exports`
    pub async fn create_export(&self, filter: &AuditQuery) -> Result<Value> {
        let envelope: ExportEnvelope = self.post_json(&["v1", "exports"], filter).await?;
        Ok(envelope.export)
    }

    /// `GET /v1/exports`
    pub async fn list_exports(&self) -> Result<Vec<Value>> {
        let envelope: ExportsEnvelope = self.get_json(&["v1", "exports"]).await?;
        Ok(envelope.exports)
    }

    /// `GET /v1/exports/{id}`
    pub async fn get_export(&self, export_id: &str) -> Result<ExportDetail> {
        self.get_json(&["v1", "exports", export_id]).await
    }

    /// `GET /.well-known/elydora/jwks.json`
    pub async fn fetch_jwks(&self) -> Result<Jwks> {
        self.get_json(&[".well-known", "elydora", "jwks.json"]).await
    }

    // ------------------------------------------------------------------
    // Request plumbing
    // ------------------------------------------------------------------

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::validation("base URL cannot carry paths"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        let response = self.execute(Method::GET, url, None).await?;
        Self::decode_json(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        let body = serde_json::to_string(body)
            .map_err(|e| Error::validation(format!("unserializable request body: {}", e)))?;
        let response = self.execute(Method::POST, url, Some(body)).await?;
        Self::decode_json(response).await
    }

    async fn post_empty<B: Serialize>(&self, segments: &[&str], body: &B) -> Result<()> {
        let url = self.endpoint(segments)?;
        let body = serde_json::to_string(body)
            .map_err(|e| Error::validation(format!("unserializable request body: {}", e)))?;
        let response = self.execute(Method::POST, url, Some(body)).await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT || status.is_success() {
            return Ok(());
        }
        Err(Self::error_from_response(response).await)
    }

    /// Issue a request with the bounded retry policy. Returns the final
    /// response (success or not); callers translate non-2xx into errors.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
    ) -> Result<Response> {
        let max_attempts = self.max_retries + 1;
        let mut attempt: u32 = 0;
        loop {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(ACCEPT, HeaderValue::from_static("application/json"));
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = &body {
                request = request
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .body(body.clone());
            }

            let outcome = request.send().await;
            attempt += 1;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable || attempt >= max_attempts {
                        debug!(%method, %url, status = status.as_u16(), attempt, "request complete");
                        return Ok(response);
                    }
                    let delay = retry_after_delay(&response).unwrap_or_else(|| backoff(attempt));
                    warn!(
                        %method, %url,
                        status = status.as_u16(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retryable status, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if attempt >= max_attempts {
                        return Err(Error::transport(format!("request to {} failed: {}", url, e)));
                    }
                    let delay = backoff(attempt);
                    warn!(
                        %method, %url,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transport error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from_response(response).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::transport(format!("failed to read response body: {}", e)))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            Error::api(
                status.as_u16(),
                ErrorCode::InternalError,
                format!("unexpected response shape: {}", e),
                "unknown",
                None,
            )
        })
    }

    /// Translate a non-2xx response into a typed error, preferring the
    /// platform's structured envelope and falling back to the raw status.
    async fn error_from_response(response: Response) -> Error {
        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("unknown status");
        let bytes = response.bytes().await.unwrap_or_default();

        if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(&bytes) {
            let code = ErrorCode::from_wire(&envelope.error.code)
                .unwrap_or(ErrorCode::InternalError);
            return Error::api(
                status.as_u16(),
                code,
                envelope.error.message,
                envelope
                    .error
                    .request_id
                    .unwrap_or_else(|| "unknown".to_string()),
                envelope.error.details,
            );
        }

        let fallback_code = if status == StatusCode::TOO_MANY_REQUESTS {
            ErrorCode::RateLimited
        } else {
            ErrorCode::InternalError
        };
        Error::api(
            status.as_u16(),
            fallback_code,
            format!("HTTP {}: {}", status.as_u16(), reason),
            "unknown",
            None,
        )
    }
}

/// Exponential backoff before attempt `n` (1-indexed count of attempts
/// already made): `min(1000 * 2^(n-1), 10_000)` ms.
fn backoff(attempts_made: u32) -> Duration {
    let exp = attempts_made.saturating_sub(1).min(31);
    Duration::from_millis((1000u64 << exp).min(MAX_BACKOFF_MS))
}

/// Integer-seconds `Retry-After`, when the response carries one.
/// HTTP-date values are ignored.
fn retry_after_delay(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// The platform's error envelope: `{error: {code, message, request_id?,
/// details?}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    details: Option<Value>,
}

// ----------------------------------------------------------------------
// Request / response payloads
// ----------------------------------------------------------------------

/// Body for `POST /v1/auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_name: Option<String>,
}

/// Body for `POST /v1/auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response from registration and login.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: Value,
    #[serde(default)]
    pub organization: Option<Value>,
    pub token: String,
}

/// Body for `POST /v1/agents/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterAgentRequest {
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Agent record plus its registered keys.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentDetail {
    pub agent: Value,
    pub keys: Value,
}

#[derive(Debug, Deserialize)]
struct ReceiptEnvelope {
    receipt: Receipt,
}

/// A stored operation, with its receipt when one was issued.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationDetail {
    pub operation: Value,
    #[serde(default)]
    pub receipt: Option<Receipt>,
}

/// Filter for audit queries and exports. Absent fields are not sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<String>,
    /// Inclusive lower bound, ms since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    /// Exclusive upper bound, ms since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// One page of audit-query results.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditPage {
    pub operations: Vec<Value>,
    #[serde(default)]
    pub cursor: Option<String>,
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
struct EpochsEnvelope {
    epochs: Vec<Value>,
}

/// An epoch and its anchor, when the epoch has been anchored.
#[derive(Debug, Clone, Deserialize)]
pub struct EpochDetail {
    pub epoch: Value,
    #[serde(default)]
    pub anchor: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ExportEnvelope {
    export: Value,
}

#[derive(Debug, Deserialize)]
struct ExportsEnvelope {
    exports: Vec<Value>,
}

/// An export job, with a download URL once the job has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportDetail {
    pub export: Value,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// The platform's receipt-signing keys.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_with_base(base: &str) -> Transport {
        Transport::new(TransportConfig {
            base_url: Some(base.to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_trailing_slashes_stripped() {
        let t = transport_with_base("https://api.example.com///");
        assert_eq!(t.base_url().as_str(), "https://api.example.com/");
        let url = t.endpoint(&["v1", "operations"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/operations");
    }

    #[test]
    fn test_path_ids_are_percent_encoded() {
        let t = transport_with_base("https://api.example.com");
        let url = t.endpoint(&["v1", "agents", "weird agent/#1"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/agents/weird%20agent%2F%231"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = Transport::new(TransportConfig {
            base_url: Some("not a url".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff(1), Duration::from_millis(1000));
        assert_eq!(backoff(2), Duration::from_millis(2000));
        assert_eq!(backoff(3), Duration::from_millis(4000));
        assert_eq!(backoff(4), Duration::from_millis(8000));
        assert_eq!(backoff(5), Duration::from_millis(10_000));
        assert_eq!(backoff(20), Duration::from_millis(10_000));
    }

    #[test]
    fn test_audit_query_omits_absent_fields() {
        let q = AuditQuery {
            agent_id: Some("a".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&q).unwrap();
        assert_eq!(json, r#"{"agent_id":"a"}"#);
    }
}
