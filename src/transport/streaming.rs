//! Decoding of streamed chat completions.
//!
//! The body is a server-sent-event stream of JSON chunks ending with
//! `data: [DONE]`.

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, trace};

use super::TransportError;
use crate::errors::{ZhinaoError, ZhinaoResult};
use crate::types::chat::ChatCompletionChunk;

/// Payload that ends a chunk stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Response whose body is still arriving.
pub struct StreamingResponse {
    /// Status code.
    pub status: u16,
    /// Headers with lower-cased names.
    pub headers: HashMap<String, String>,
    /// Body as it is read off the connection.
    pub stream: Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Incremental decoder for the `data:` payloads of a server-sent-event body.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network reads decode correctly. A complete line
/// that is not valid UTF-8 is an error. Consecutive
/// `data:` lines of one event are joined with `\n`. Other fields and
/// comments are ignored. A bare line holding a JSON object or `[DONE]`
/// counts as a complete payload on its own.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    data: Option<String>,
}

impl SseParser {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns the payloads completed by them.
    ///
    /// # Errors
    ///
    /// Fails with [`ZhinaoError::Serialization`] on a line that is not
    /// valid UTF-8.
    pub fn parse(&mut self, bytes: &[u8]) -> ZhinaoResult<Vec<String>> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            let line = decode_line(line)?;
            payloads.extend(self.line(line.trim_end_matches('\r')));
        }

        Ok(payloads)
    }

    /// Returns whatever the body ended with, if it was not terminated by a
    /// blank line.
    ///
    /// # Errors
    ///
    /// Fails when the unterminated tail is not valid UTF-8.
    pub fn flush(&mut self) -> ZhinaoResult<Option<String>> {
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            let line = decode_line(rest)?;
            if let Some(payload) = self.line(line.trim_end_matches('\r')) {
                return Ok(Some(payload));
            }
        }
        Ok(self.data.take())
    }

    fn line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.data.take();
        }
        if line.starts_with('{') || line == DONE_SENTINEL {
            return Some(line.to_string());
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
        None
    }
}

fn decode_line(line: Vec<u8>) -> ZhinaoResult<String> {
    String::from_utf8(line).map_err(|e| ZhinaoError::Serialization {
        message: format!("Stream line is not valid UTF-8: {}", e.utf8_error()),
    })
}

pin_project! {
    /// Stream of raw chat completion chunks decoded from an SSE body.
    ///
    /// Ends at the `[DONE]` sentinel or when the body ends. A payload that
    /// does not decode as a chunk is an error and ends the stream.
    pub struct ChunkStream {
        #[pin]
        inner: Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>,
        parser: SseParser,
        pending: VecDeque<String>,
        eof: bool,
        done: bool,
    }
}

impl ChunkStream {
    /// Creates a chunk stream over a streaming response body.
    pub fn new(response: StreamingResponse) -> Self {
        Self {
            inner: response.stream,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            eof: false,
            done: false,
        }
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("pending", &self.pending.len())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Stream for ChunkStream {
    type Item = ZhinaoResult<ChatCompletionChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.done {
                return Poll::Ready(None);
            }

            if let Some(payload) = this.pending.pop_front() {
                let data = payload.trim();
                if data.is_empty() {
                    continue;
                }
                if data == DONE_SENTINEL {
                    trace!("Stream completed with [DONE]");
                    *this.done = true;
                    this.pending.clear();
                    return Poll::Ready(None);
                }

                return match serde_json::from_str::<ChatCompletionChunk>(data) {
                    Ok(chunk) => Poll::Ready(Some(Ok(chunk))),
                    Err(e) => {
                        debug!(error = %e, data = %data, "Failed to decode stream chunk");
                        *this.done = true;
                        Poll::Ready(Some(Err(ZhinaoError::Serialization {
                            message: format!("Failed to decode stream chunk: {e}"),
                        })))
                    }
                };
            }

            if *this.eof {
                *this.done = true;
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => match this.parser.parse(&bytes) {
                    Ok(payloads) => this.pending.extend(payloads),
                    Err(e) => {
                        *this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    *this.done = true;
                    let err = match e {
                        TransportError::Timeout { .. } => ZhinaoError::from(e),
                        other => ZhinaoError::Stream {
                            message: other.to_string(),
                        },
                    };
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    *this.eof = true;
                    match this.parser.flush() {
                        Ok(tail) => this.pending.extend(tail),
                        Err(e) => {
                            *this.done = true;
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
