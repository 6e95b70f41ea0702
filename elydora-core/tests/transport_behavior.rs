//! Transport behavior against a scripted HTTP stub.
//!
//! The stub is a bare tokio TCP loop serving one canned response per
//! connection, which is enough to pin down the retry policy, the error
//! taxonomy, and header composition without a mock-server dependency.

use elydora_core::codec::b64u_encode;
use elydora_core::transport::{Transport, TransportConfig};
use elydora_core::{BuilderConfig, ErrorCode, OperationBuilder, OperationRequest};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One canned response per accepted connection; the last entry repeats.
struct StubServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    async fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task_hits = Arc::clone(&hits);
        let task_requests = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let n = task_hits.fetch_add(1, Ordering::SeqCst);
                let response = responses
                    .get(n)
                    .or_else(|| responses.last())
                    .cloned()
                    .unwrap_or_default();

                let request = read_request(&mut socket).await;
                task_requests.lock().unwrap().push(request);

                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url,
            hits,
            requests,
        }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn first_request(&self) -> String {
        self.requests.lock().unwrap().first().cloned().unwrap_or_default()
    }
}

/// Read one HTTP/1.1 request (head plus Content-Length body).
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            break;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(head_end) = find_head_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..head_end]);
            let content_length = head
                .lines()
                .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(str::trim).map(str::to_string))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn http_response(status: &str, extra_headers: &[&str], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {}\r\n", status);
    for header in extra_headers {
        response.push_str(header);
        response.push_str("\r\n");
    }
    response.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ));
    response
}

fn agent_body() -> String {
    json!({ "agent": { "agent_id": "agent-1", "status": "active" }, "keys": [] }).to_string()
}

fn transport_for(server: &StubServer, max_retries: u32) -> Transport {
    Transport::new(TransportConfig {
        base_url: Some(server.base_url.clone()),
        token: Some("tok_test".to_string()),
        max_retries: Some(max_retries),
        timeout: Some(Duration::from_secs(5)),
    })
    .unwrap()
}

// ============================================================================
// Retry policy
// ============================================================================

#[tokio::test]
async fn retry_after_header_drives_the_delay() {
    let server = StubServer::start(vec![
        http_response("503 Service Unavailable", &["Retry-After: 2"], "busy"),
        http_response("200 OK", &[], &agent_body()),
    ])
    .await;
    let transport = transport_for(&server, 3);

    let started = Instant::now();
    let detail = transport.get_agent("agent-1").await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(server.hits(), 2, "exactly two requests");
    assert!(
        elapsed >= Duration::from_millis(1900) && elapsed < Duration::from_secs(5),
        "slept ~2s, got {:?}",
        elapsed
    );
    assert_eq!(detail.agent["agent_id"], "agent-1");
}

#[tokio::test]
async fn retry_budget_bounds_attempts() {
    // Retry-After: 0 keeps the test fast while still exercising the header.
    let server = StubServer::start(vec![http_response(
        "429 Too Many Requests",
        &["Retry-After: 0"],
        "slow down",
    )])
    .await;
    let transport = transport_for(&server, 2);

    let err = transport.get_agent("agent-1").await.unwrap_err();
    assert_eq!(server.hits(), 3, "1 initial + 2 retries");
    assert_eq!(err.status, 429);
    assert_eq!(err.code, ErrorCode::RateLimited);
    assert_eq!(err.request_id, "unknown");
}

#[tokio::test]
async fn non_retryable_status_fails_fast() {
    let server = StubServer::start(vec![http_response(
        "400 Bad Request",
        &["Content-Type: application/json"],
        r#"{"error":{"code":"VALIDATION_ERROR","message":"bad payload","request_id":"r1"}}"#,
    )])
    .await;
    let transport = transport_for(&server, 3);

    let err = transport.get_agent("agent-1").await.unwrap_err();
    assert_eq!(server.hits(), 1, "4xx is never retried");
    assert_eq!(err.status, 400);
    assert_eq!(err.code, ErrorCode::ValidationError);
    assert_eq!(err.message, "bad payload");
    assert_eq!(err.request_id, "r1");
}

#[tokio::test]
async fn typed_platform_errors_pass_through_unretried() {
    let server = StubServer::start(vec![http_response(
        "409 Conflict",
        &[],
        r#"{"error":{"code":"PREV_HASH_MISMATCH","message":"fork detected","request_id":"r7","details":{"expected":"abc"}}}"#,
    )])
    .await;
    let transport = transport_for(&server, 3);

    let err = transport.get_agent("agent-1").await.unwrap_err();
    assert_eq!(server.hits(), 1);
    assert_eq!(err.code, ErrorCode::PrevHashMismatch);
    assert_eq!(err.details.unwrap()["expected"], "abc");
}

// ============================================================================
// Response handling
// ============================================================================

#[tokio::test]
async fn no_content_maps_to_unit() {
    let server =
        StubServer::start(vec!["HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_string()])
            .await;
    let transport = transport_for(&server, 0);

    transport.freeze_agent("agent-1", "suspicious").await.unwrap();
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn unparseable_error_body_becomes_internal_error() {
    let server = StubServer::start(vec![http_response(
        "500 Internal Server Error",
        &[],
        "<html>boom</html>",
    )])
    .await;
    let transport = transport_for(&server, 0);

    let err = transport.get_agent("agent-1").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InternalError);
    assert_eq!(err.status, 500);
    assert_eq!(err.message, "HTTP 500: Internal Server Error");
    assert_eq!(err.request_id, "unknown");
}

#[tokio::test]
async fn unknown_error_codes_degrade_to_internal_error() {
    let server = StubServer::start(vec![http_response(
        "400 Bad Request",
        &[],
        r#"{"error":{"code":"BRAND_NEW_CODE","message":"from the future","request_id":"r9"}}"#,
    )])
    .await;
    let transport = transport_for(&server, 0);

    let err = transport.get_agent("agent-1").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InternalError);
    assert_eq!(err.message, "from the future");
    assert_eq!(err.request_id, "r9");
}

// ============================================================================
// Submission & headers
// ============================================================================

#[tokio::test]
async fn submit_sends_canonical_body_with_auth_headers() {
    let receipt = json!({
        "receipt": {
            "receipt_id": "rcp_1",
            "operation_id": "ignored",
            "seq_no": 1,
            "chain_hash": "h",
            "server_received_at": 1_700_000_000_000i64,
            "queue_message_id": "q1",
            "receipt_hash": "rh",
            "elydora_kid": "elydora-2026",
            "elydora_signature": "sig",
            "receipt_version": "1.0"
        }
    });
    let server = StubServer::start(vec![http_response("200 OK", &[], &receipt.to_string())]).await;
    let transport = transport_for(&server, 0);

    let builder = OperationBuilder::new(BuilderConfig {
        org_id: "org-1".to_string(),
        agent_id: "agent-1".to_string(),
        private_seed: b64u_encode([6u8; 32]),
        kid: None,
        ttl_ms: None,
    })
    .unwrap();
    let record = builder
        .build(OperationRequest {
            operation_type: "tool.exec".to_string(),
            subject: json!({"tool": "bash"}),
            action: json!({"command": "ls"}),
            payload: None,
        })
        .unwrap();

    let receipt = transport.submit_operation(&record).await.unwrap();
    assert_eq!(receipt.receipt_id, "rcp_1");

    let request = server.first_request();
    assert!(request.starts_with("POST /v1/operations HTTP/1.1"));
    assert!(request.contains("authorization: Bearer tok_test")
        || request.contains("Authorization: Bearer tok_test"));
    assert!(request.contains("accept: application/json")
        || request.contains("Accept: application/json"));
    assert!(request.contains("content-type: application/json")
        || request.contains("Content-Type: application/json"));

    // The body is the canonical envelope: sorted keys, no whitespace.
    let body = request.split("\r\n\r\n").nth(1).unwrap();
    assert_eq!(body, record.canonical_json().unwrap());
    assert!(body.starts_with("{\"action\""));
}

#[tokio::test]
async fn path_ids_are_percent_encoded_on_the_wire() {
    let server = StubServer::start(vec![http_response("200 OK", &[], &agent_body())]).await;
    let transport = transport_for(&server, 0);

    transport.get_agent("agent one/#x").await.unwrap();
    let request = server.first_request();
    assert!(
        request.starts_with("GET /v1/agents/agent%20one%2F%23x HTTP/1.1"),
        "got: {}",
        request.lines().next().unwrap_or_default()
    );
}
