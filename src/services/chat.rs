//! Chat completions service.

use futures::TryStreamExt;
use http::header::{ACCEPT, CONTENT_TYPE};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::auth::AuthProvider;
use crate::errors::{ApiErrorResponse, ZhinaoError, ZhinaoResult};
use crate::streaming::MergedChunkStream;
use crate::transport::{ChunkStream, HttpRequest, HttpResponse, HttpTransport};
use crate::types::chat::{ChatCompletion, ChatCompletionRequest};

/// Merged chunk stream returned by [`ChatService::create_stream`].
pub type ChatCompletionStream = MergedChunkStream<ChunkStream>;

/// Chat completions service.
///
/// Performs no retries itself; the blocking path is wrapped in a
/// [`RetryPolicy`](crate::resilience::RetryPolicy) by the chat model.
pub struct ChatService {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthProvider>,
    completions_path: String,
    custom_headers: Vec<(String, String)>,
}

impl ChatService {
    /// Creates a new chat service.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthProvider>,
        completions_path: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            auth,
            completions_path: completions_path.into(),
            custom_headers: Vec::new(),
        }
    }

    /// Adds headers sent with every request.
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.custom_headers = headers;
        self
    }

    /// Creates a chat completion.
    ///
    /// Returns `None` when the server answers with an empty body.
    ///
    /// # Errors
    ///
    /// Fails with [`ZhinaoError::InvalidArgument`] if the request has
    /// `stream` set.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn create(&self, request: &ChatCompletionRequest) -> ZhinaoResult<Option<ChatCompletion>> {
        if request.stream {
            return Err(ZhinaoError::invalid_param(
                "Request must set the stream property to false.",
                "stream",
            ));
        }
        request.validate()?;

        let http_request = self.build_request(request, false)?;
        let response = self.transport.send(http_request).await?;

        if !response.is_success() {
            return Err(parse_error_response(&response));
        }
        if response.is_empty() {
            debug!("Empty completion body");
            return Ok(None);
        }

        response.json().map(Some).map_err(|e| ZhinaoError::Serialization {
            message: format!("Failed to parse completion: {e}"),
        })
    }

    /// Creates a streaming chat completion.
    ///
    /// The returned stream has streamed tool calls already reassembled.
    ///
    /// # Errors
    ///
    /// Fails with [`ZhinaoError::InvalidArgument`] if the request does not
    /// have `stream` set.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn create_stream(&self, request: &ChatCompletionRequest) -> ZhinaoResult<ChatCompletionStream> {
        if !request.stream {
            return Err(ZhinaoError::invalid_param(
                "Request must set the stream property to true.",
                "stream",
            ));
        }
        request.validate()?;

        let http_request = self.build_request(request, true)?;
        let response = self.transport.send_streaming(http_request).await?;

        if !(200..300).contains(&response.status) {
            let status = response.status;
            let headers = response.headers;
            let body = response
                .stream
                .try_fold(Vec::new(), |mut acc, bytes| async move {
                    acc.extend_from_slice(&bytes);
                    Ok(acc)
                })
                .await
                .unwrap_or_default();
            return Err(parse_error_response(&HttpResponse {
                status,
                headers,
                body,
            }));
        }

        Ok(MergedChunkStream::new(ChunkStream::new(response)))
    }

    fn build_request(&self, request: &ChatCompletionRequest, streaming: bool) -> ZhinaoResult<HttpRequest> {
        let body = serde_json::to_vec(request).map_err(|e| ZhinaoError::Serialization {
            message: format!("Failed to serialize request: {e}"),
        })?;

        let mut http_request = HttpRequest::post(self.completions_path.clone())
            .with_header(CONTENT_TYPE.as_str(), "application/json")
            .with_body(body);

        if streaming {
            http_request = http_request.with_header(ACCEPT.as_str(), "text/event-stream");
        }

        for (name, value) in &self.custom_headers {
            http_request = http_request.with_header(name.clone(), value.clone());
        }

        self.auth.apply_auth(&mut http_request.headers);

        Ok(http_request)
    }
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("completions_path", &self.completions_path)
            .finish_non_exhaustive()
    }
}

fn request_id(headers: &HashMap<String, String>) -> Option<String> {
    headers.get("x-request-id").cloned()
}

fn retry_after(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Maps a non-2xx response to an error, using the vendor error body when
/// it parses.
fn parse_error_response(response: &HttpResponse) -> ZhinaoError {
    match serde_json::from_slice::<ApiErrorResponse>(&response.body) {
        Ok(body) => map_error(response.status, body, &response.headers),
        Err(_) => parse_error_status(response.status, &response.headers),
    }
}

fn map_error(status: u16, error: ApiErrorResponse, headers: &HashMap<String, String>) -> ZhinaoError {
    let detail = error.error;

    match status {
        401 => ZhinaoError::Authentication {
            message: detail.message,
        },
        403 => ZhinaoError::Authorization {
            message: detail.message,
        },
        404 => ZhinaoError::NotFound {
            message: detail.message,
        },
        400 | 422 => ZhinaoError::Validation {
            message: detail.message,
            param: detail.param,
        },
        429 => ZhinaoError::RateLimit {
            message: detail.message,
            retry_after: retry_after(headers),
        },
        _ => ZhinaoError::Server {
            message: detail.message,
            status_code: status,
            request_id: request_id(headers),
        },
    }
}

fn parse_error_status(status: u16, headers: &HashMap<String, String>) -> ZhinaoError {
    match status {
        401 => ZhinaoError::Authentication {
            message: "Invalid API key".to_string(),
        },
        403 => ZhinaoError::Authorization {
            message: "Forbidden".to_string(),
        },
        404 => ZhinaoError::NotFound {
            message: "Resource not found".to_string(),
        },
        400 | 422 => ZhinaoError::Validation {
            message: format!("Request rejected with status {status}"),
            param: None,
        },
        429 => ZhinaoError::RateLimit {
            message: "Rate limit exceeded".to_string(),
            retry_after: retry_after(headers),
        },
        _ => ZhinaoError::Server {
            message: format!("Unexpected status: {status}"),
            status_code: status,
            request_id: request_id(headers),
        },
    }
}
