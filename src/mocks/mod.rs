//! Test doubles for running the client without a network.
//!
//! [`MockTransport`] replays scripted responses and records what was sent.
//! [`fixtures`] builds Zhinao completions and stream payloads.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, StreamingResponse, TransportError};

/// Transport answering requests from a queue, in order.
///
/// When the queue runs dry every further request gets a 500.
pub struct MockTransport {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// What the client sent.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Path relative to the base URL.
    pub path: String,
    /// Serialized body.
    pub body: Option<Vec<u8>>,
    /// Headers, authorization included.
    pub headers: HashMap<String, String>,
}

impl RecordedRequest {
    /// Body decoded as JSON, if it decodes.
    pub fn json(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }
}

/// A scripted reply. Streamed replies deliver `frames` as separate reads.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Status code.
    pub status: u16,
    /// Header names and values.
    pub headers: HashMap<String, String>,
    /// Body, delivered as separate network reads when streamed.
    pub frames: Vec<Vec<u8>>,
}

impl MockResponse {
    /// Creates a response with a raw body.
    pub fn raw(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            frames: vec![body.into()],
        }
    }

    /// 200 with `value` as the JSON body.
    pub fn json<T: serde::Serialize>(value: &T) -> Self {
        Self::raw(200, serde_json::to_vec(value).unwrap_or_default())
            .with_header("content-type", "application/json")
    }

    /// `status` with a Zhinao error body carrying `message`.
    pub fn error(status: u16, message: &str) -> Self {
        let error = serde_json::json!({
            "error": {
                "code": status.to_string(),
                "message": message,
                "type": "error"
            }
        });
        Self::raw(status, serde_json::to_vec(&error).unwrap_or_default())
            .with_header("content-type", "application/json")
    }

    /// Creates a server-sent-event response, one `data:` frame per payload.
    pub fn sse(payloads: &[&str]) -> Self {
        Self {
            status: 200,
            headers: HashMap::from([("content-type".to_string(), "text/event-stream".to_string())]),
            frames: payloads
                .iter()
                .map(|p| format!("data: {p}\n\n").into_bytes())
                .collect(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    fn body(&self) -> Vec<u8> {
        self.frames.concat()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Empty queue.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Appends a reply.
    pub fn queue(&self, response: MockResponse) {
        lock(&self.responses).push_back(response);
    }

    /// Appends a 200 reply with a JSON body.
    pub fn queue_json<T: serde::Serialize>(&self, value: &T) {
        self.queue(MockResponse::json(value));
    }

    /// Appends an error reply.
    pub fn queue_error(&self, status: u16, message: &str) {
        self.queue(MockResponse::error(status, message));
    }

    /// Everything sent so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        lock(&self.requests).last().cloned()
    }

    /// How many requests were sent.
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next_response(&self, request: HttpRequest) -> MockResponse {
        lock(&self.requests).push(RecordedRequest {
            path: request.path,
            body: request.body,
            headers: request.headers,
        });

        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| MockResponse::error(500, "mock transport has no reply queued"))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self.next_response(request);
        Ok(HttpResponse {
            status: response.status,
            body: response.body(),
            headers: response.headers,
        })
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let response = self.next_response(request);
        let frames: Vec<Result<Bytes, TransportError>> =
            response.frames.into_iter().map(|f| Ok(Bytes::from(f))).collect();

        Ok(StreamingResponse {
            status: response.status,
            headers: response.headers,
            stream: Box::pin(futures::stream::iter(frames)),
        })
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("queued", &lock(&self.responses).len())
            .field("sent", &self.request_count())
            .finish()
    }
}

/// Canned Zhinao payloads.
pub mod fixtures {
    use crate::types::chat::{
        ChatCompletion, ChatCompletionMessage, Choice, FinishReason, ToolCall, Usage,
    };

    /// A completion with one text choice.
    pub fn completion(content: &str) -> ChatCompletion {
        ChatCompletion {
            choices: Some(vec![Choice {
                message: ChatCompletionMessage::assistant(content, None),
                finish_reason: Some(FinishReason::Stop),
                index: Some(0),
            }]),
            created: Some(1_705_312_345),
            id: Some("mock-completion".to_string()),
            model: Some("360gpt-pro".to_string()),
            object: Some(String::new()),
            usage: Some(Usage::new(10, 5, 15)),
        }
    }

    /// A completion requesting one tool call.
    pub fn tool_call_completion(id: &str, name: &str, arguments: &str) -> ChatCompletion {
        ChatCompletion {
            choices: Some(vec![Choice {
                message: ChatCompletionMessage::assistant(
                    "",
                    Some(vec![ToolCall::function(id, name, arguments)]),
                ),
                finish_reason: Some(FinishReason::ToolCalls),
                index: Some(0),
            }]),
            created: Some(1_705_312_340),
            id: Some("mock-tool-call".to_string()),
            model: Some("360gpt-pro".to_string()),
            object: Some(String::new()),
            usage: Some(Usage::new(20, 8, 28)),
        }
    }

    /// SSE payload of a text chunk.
    pub fn text_chunk(id: &str, content: &str) -> String {
        serde_json::json!({
            "id": id,
            "model": "360gpt-pro",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    /// SSE payload of the final chunk with a finish reason and usage.
    pub fn stop_chunk(id: &str, usage: Usage) -> String {
        serde_json::json!({
            "id": id,
            "model": "360gpt-pro",
            "choices": [{"index": 0, "delta": {"content": ""}, "finish_reason": "stop"}],
            "usage": usage
        })
        .to_string()
    }

    /// SSE payloads streaming one tool call in two argument fragments.
    pub fn tool_call_chunks(id: &str, call_id: &str, name: &str, head: &str, tail: &str) -> Vec<String> {
        vec![
            serde_json::json!({
                "id": id,
                "choices": [{"index": 0, "delta": {"role": "assistant", "tool_calls": [
                    {"id": call_id, "type": "function", "function": {"name": name, "arguments": head}}
                ]}}]
            })
            .to_string(),
            serde_json::json!({
                "id": id,
                "choices": [{"index": 0, "delta": {"tool_calls": [
                    {"function": {"arguments": tail}}
                ]}, "finish_reason": "tool_calls"}]
            })
            .to_string(),
        ]
    }
}
