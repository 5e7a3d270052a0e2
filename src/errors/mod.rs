//! Error types for the Zhinao client.
//!
//! Usage errors (bad requests, malformed streams, unknown tools) fail fast
//! and are never retried. API and transport errors carry enough detail for
//! [`RetryPolicy`](crate::resilience::RetryPolicy) to decide whether another
//! attempt is worthwhile.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type ZhinaoResult<T> = Result<T, ZhinaoError>;

/// Everything that can go wrong talking to Zhinao.
#[derive(Debug, Error)]
pub enum ZhinaoError {
    /// The client could not be configured.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong with the configuration.
        message: String,
    },

    /// The caller or the server broke the protocol.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
        /// Offending field, when one can be named.
        param: Option<String>,
    },

    /// HTTP 401.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Message from the API.
        message: String,
    },

    /// HTTP 403.
    #[error("Authorization failed: {message}")]
    Authorization {
        /// Message from the API.
        message: String,
    },

    /// HTTP 404, usually an unknown model or a wrong completions path.
    #[error("Not found: {message}")]
    NotFound {
        /// Message from the API.
        message: String,
    },

    /// HTTP 400 or 422.
    #[error("Validation error: {message}")]
    Validation {
        /// Message from the API.
        message: String,
        /// Parameter the API complained about.
        param: Option<String>,
    },

    /// HTTP 429.
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        /// Message from the API.
        message: String,
        /// Value of the `retry-after` header.
        retry_after: Option<Duration>,
    },

    /// Any other non-2xx status.
    #[error("Server error (HTTP {status_code}): {message}")]
    Server {
        /// Message from the API, or the status text.
        message: String,
        /// Status code.
        status_code: u16,
        /// Value of the `x-request-id` header.
        request_id: Option<String>,
    },

    /// The connection failed or was cut.
    #[error("Network error: {message}")]
    Network {
        /// Underlying error.
        message: String,
    },

    /// The request did not complete in time.
    #[error("Request timeout: {message}")]
    Timeout {
        /// Underlying error.
        message: String,
    },

    /// The event stream ended in a broken state.
    #[error("Stream error: {message}")]
    Stream {
        /// What went wrong.
        message: String,
    },

    /// JSON could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Underlying error.
        message: String,
    },

    /// A local tool returned an error.
    #[error("Tool '{tool_name}' failed: {message}")]
    ToolExecution {
        /// Name the model called the tool by.
        tool_name: String,
        /// Error reported by the tool.
        message: String,
    },
}

impl ZhinaoError {
    /// Whether a blocking call that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ZhinaoError::RateLimit { .. } | ZhinaoError::Timeout { .. } | ZhinaoError::Network { .. } => true,
            ZhinaoError::Server { status_code, .. } => (500..=504).contains(status_code),
            _ => false,
        }
    }

    /// Delay requested by the server, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ZhinaoError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status behind this error, for errors that came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ZhinaoError::Authentication { .. } => Some(401),
            ZhinaoError::Authorization { .. } => Some(403),
            ZhinaoError::NotFound { .. } => Some(404),
            ZhinaoError::RateLimit { .. } => Some(429),
            ZhinaoError::Server { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Usage error without a named field.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ZhinaoError::InvalidArgument {
            message: message.into(),
            param: None,
        }
    }

    /// Usage error naming the offending field.
    pub fn invalid_param(message: impl Into<String>, param: impl Into<String>) -> Self {
        ZhinaoError::InvalidArgument {
            message: message.into(),
            param: Some(param.into()),
        }
    }

    /// Configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        ZhinaoError::Configuration {
            message: message.into(),
        }
    }

    /// Server error without a request ID.
    pub fn server(status_code: u16, message: impl Into<String>) -> Self {
        ZhinaoError::Server {
            message: message.into(),
            status_code,
            request_id: None,
        }
    }

    /// Failure of the local tool `tool_name`.
    pub fn tool_execution(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        ZhinaoError::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }
}

/// Error body returned by the Zhinao API.
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorDetail,
}

/// The `error` object of an API error body.
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorDetail {
    /// Error category.
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Parameter the error refers to.
    pub param: Option<String>,
    /// Vendor error code, numeric or string.
    pub code: Option<serde_json::Value>,
}

impl From<serde_json::Error> for ZhinaoError {
    fn from(err: serde_json::Error) -> Self {
        ZhinaoError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for ZhinaoError {
    fn from(err: url::ParseError) -> Self {
        ZhinaoError::Configuration {
            message: format!("Invalid URL: {err}"),
        }
    }
}
