//! HTTP transport layer for the Zhinao client.
//!
//! Provides the HTTP transport abstraction, the reqwest implementation, and
//! decoding of server-sent chunk streams.

mod http;
mod streaming;

pub use http::{HttpRequest, HttpResponse, HttpTransport, HttpTransportImpl};
pub use streaming::{ChunkStream, SseParser, StreamingResponse, DONE_SENTINEL};

use std::time::Duration;

use crate::errors::ZhinaoError;

/// Transport error types.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection error.
    #[error("Connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// Timeout error.
    #[error("Timeout after {timeout:?}")]
    Timeout {
        /// Timeout duration.
        timeout: Duration,
    },

    /// The response could not be read.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },
}

impl From<TransportError> for ZhinaoError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { .. } => ZhinaoError::Timeout {
                message: err.to_string(),
            },
            TransportError::Connection { .. } | TransportError::InvalidResponse { .. } => {
                ZhinaoError::Network {
                    message: err.to_string(),
                }
            }
        }
    }
}
