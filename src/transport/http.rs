//! reqwest-backed transport.
//!
//! Zhinao exposes a single POST endpoint, so requests carry only a path
//! relative to the configured base URL, headers and a JSON body.
//!
//! The timeout bounds a whole blocking exchange. For streamed responses it
//! bounds the wait for the response headers and then each gap between two
//! body reads, so a healthy stream may run for as long as the model writes.

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, RequestBuilder};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{StreamingResponse, TransportError};

const USER_AGENT: &str = concat!("zhinao-client/", env!("CARGO_PKG_VERSION"));

/// Outgoing POST request.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    /// Path joined onto the base URL.
    pub path: String,
    /// Header names and values.
    pub headers: HashMap<String, String>,
    /// Serialized body.
    pub body: Option<Vec<u8>>,
    /// Overrides the transport timeout for this request.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Starts a POST request to `path`.
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a header, replacing any previous value under the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets a per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fully read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Headers with lower-cased names.
    pub headers: HashMap<String, String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body holds nothing but whitespace.
    pub fn is_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Fails when the body does not decode into `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Sends requests to the Zhinao API.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and reads the whole body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Sends a request and hands back the body as it arrives.
    async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingResponse, TransportError>;
}

/// [`HttpTransport`] over a pooled reqwest client.
pub struct HttpTransportImpl {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransportImpl {
    /// Creates a transport for `base_url`. `timeout` applies to requests
    /// that do not set their own.
    ///
    /// # Errors
    ///
    /// Fails when the TLS backend cannot be initialised.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::Connection {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url_for(&self, path: &str) -> String {
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn prepare(&self, request: HttpRequest) -> (RequestBuilder, Duration) {
        let timeout = request.timeout.unwrap_or(self.timeout);
        let mut builder = self.client.post(self.url_for(&request.path));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        (builder, timeout)
    }
}

/// Yields the body of a streamed response, failing with
/// [`TransportError::Timeout`] when no bytes arrive for `idle`.
fn idle_bounded<S>(body: S, idle: Duration) -> impl Stream<Item = Result<Bytes, TransportError>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    try_stream! {
        futures::pin_mut!(body);
        loop {
            match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(bytes)) => {
                    let bytes = bytes.map_err(|e| classify(&e, idle))?;
                    yield bytes;
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(?idle, "Stream stalled");
                    Err::<(), _>(TransportError::Timeout { timeout: idle })?;
                }
            }
        }
    }
}

fn classify(e: &reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout { timeout }
    } else if e.is_connect() {
        TransportError::Connection {
            message: e.to_string(),
        }
    } else {
        TransportError::InvalidResponse {
            message: e.to_string(),
        }
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

#[async_trait]
impl HttpTransport for HttpTransportImpl {
    #[instrument(skip_all, fields(path = %request.path))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let (builder, timeout) = self.prepare(request);
        let response = builder
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(&e, timeout))?;
        let status = response.status().as_u16();
        debug!(status, "Response received");
        let headers = header_map(response.headers());
        let body = response.bytes().await.map_err(|e| classify(&e, timeout))?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    #[instrument(skip_all, fields(path = %request.path))]
    async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingResponse, TransportError> {
        let (builder, timeout) = self.prepare(request);
        let response = tokio::time::timeout(timeout, builder.send())
            .await
            .map_err(|_| TransportError::Timeout { timeout })?
            .map_err(|e| classify(&e, timeout))?;
        let status = response.status().as_u16();
        debug!(status, "Stream opened");
        let headers = header_map(response.headers());

        Ok(StreamingResponse {
            status,
            headers,
            stream: Box::pin(idle_bounded(response.bytes_stream(), timeout)),
        })
    }
}

impl std::fmt::Debug for HttpTransportImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransportImpl")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
