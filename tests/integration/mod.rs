//! Integration tests using WireMock
//!
//! These tests drive the full request/response cycle against a mock HTTP
//! server: serialization, authentication, SSE decoding, and error mapping.

pub mod chat_completions;
pub mod streaming;
pub mod tool_calling;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zhinao_client::resilience::RetryConfig;
use zhinao_client::{ZhinaoClient, ZhinaoClientBuilder};

pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Starts a mock server.
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Client builder pointing at the mock server, without retries.
pub fn client_builder(server: &MockServer) -> ZhinaoClientBuilder {
    ZhinaoClient::builder()
        .api_key("test-api-key")
        .base_url(server.uri())
        .retry_config(RetryConfig::no_retries())
}

/// Client pointing at the mock server.
pub fn client_for(server: &MockServer) -> ZhinaoClient {
    client_builder(server).build().expect("Failed to build client")
}

/// Mock matching an authenticated completions request.
pub fn completions_mock() -> wiremock::MockBuilder {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("authorization", "Bearer test-api-key"))
}

/// SSE response carrying one `data:` event per payload and a final `[DONE]`.
pub fn sse_response(payloads: &[serde_json::Value]) -> ResponseTemplate {
    let mut body: String = payloads
        .iter()
        .map(|p| format!("data: {p}\n\n"))
        .collect();
    body.push_str("data: [DONE]\n\n");

    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

/// Error response with a vendor error body.
pub fn error_response(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(serde_json::json!({
        "error": {
            "code": status.to_string(),
            "message": message,
            "type": "invalid_request_error",
            "param": null
        }
    }))
}
