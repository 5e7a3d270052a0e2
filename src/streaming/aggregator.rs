//! Windowing of a chunk stream into merged tool-call groups.

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, trace};

use super::merge::{
    ensure_single_tool_call, is_streaming_tool_function_call,
    is_streaming_tool_function_call_finish, merge_chunks,
};
use crate::errors::ZhinaoResult;
use crate::types::chat::ChatCompletionChunk;

/// Aggregation state.
#[derive(Debug, Default)]
enum MergeState {
    /// Outside a tool call; chunks pass through.
    #[default]
    Idle,
    /// Inside a tool call; holds the fold so far.
    Accumulating(ChatCompletionChunk),
}

/// Groups streamed tool-call fragments into single chunks.
///
/// A chunk whose delta carries a tool call opens a group. Every chunk that
/// follows, whatever it carries, joins the group until one with
/// `finish_reason = "tool_calls"` closes it. The closing chunk belongs to
/// the group. Chunks outside a group are emitted unchanged.
#[derive(Debug, Default)]
pub struct ToolCallAggregator {
    state: MergeState,
}

impl ToolCallAggregator {
    /// Creates an idle aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a tool-call group is open.
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, MergeState::Accumulating(_))
    }

    /// Feeds one chunk. Returns a chunk when one is ready for the consumer.
    ///
    /// # Errors
    ///
    /// Fails if a fragment carries more than one tool call. The open group
    /// is discarded.
    pub fn push(&mut self, chunk: ChatCompletionChunk) -> ZhinaoResult<Option<ChatCompletionChunk>> {
        if let Err(e) = ensure_single_tool_call(&chunk) {
            self.reset();
            return Err(e);
        }

        match std::mem::take(&mut self.state) {
            MergeState::Idle => {
                if !is_streaming_tool_function_call(&chunk) {
                    return Ok(Some(chunk));
                }
                if is_streaming_tool_function_call_finish(&chunk) {
                    trace!("Tool call opened and closed in a single chunk");
                    return Ok(Some(chunk));
                }
                trace!("Tool call group opened");
                self.state = MergeState::Accumulating(chunk);
                Ok(None)
            }
            MergeState::Accumulating(accumulated) => {
                let closes = is_streaming_tool_function_call_finish(&chunk);
                let merged = merge_chunks(accumulated, chunk)?;
                if closes {
                    trace!(
                        tool_calls = merged.tool_calls().len(),
                        "Tool call group closed"
                    );
                    Ok(Some(merged))
                } else {
                    self.state = MergeState::Accumulating(merged);
                    Ok(None)
                }
            }
        }
    }

    /// Signals normal end of input. Returns the open group, if any, so that
    /// no received data is dropped.
    pub fn finish(&mut self) -> Option<ChatCompletionChunk> {
        match std::mem::take(&mut self.state) {
            MergeState::Idle => None,
            MergeState::Accumulating(accumulated) => {
                debug!("Stream ended inside a tool call, flushing partial group");
                Some(accumulated)
            }
        }
    }

    /// Drops any open group.
    pub fn reset(&mut self) {
        self.state = MergeState::Idle;
    }
}

pin_project! {
    /// Stream adapter applying [`ToolCallAggregator`] to a chunk stream.
    ///
    /// Upstream errors are forwarded and end the stream; any open group is
    /// discarded. Dropping the adapter drops the upstream stream with it.
    pub struct MergedChunkStream<S> {
        #[pin]
        inner: S,
        aggregator: ToolCallAggregator,
        done: bool,
    }
}

impl<S> MergedChunkStream<S>
where
    S: Stream<Item = ZhinaoResult<ChatCompletionChunk>>,
{
    /// Wraps a stream of raw chunks.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            aggregator: ToolCallAggregator::new(),
            done: false,
        }
    }
}

impl<S> std::fmt::Debug for MergedChunkStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedChunkStream")
            .field("aggregator", &self.aggregator)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<S> Stream for MergedChunkStream<S>
where
    S: Stream<Item = ZhinaoResult<ChatCompletionChunk>>,
{
    type Item = ZhinaoResult<ChatCompletionChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.done {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => match this.aggregator.push(chunk) {
                    Ok(Some(ready)) => return Poll::Ready(Some(Ok(ready))),
                    Ok(None) => continue,
                    Err(e) => {
                        *this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    this.aggregator.reset();
                    *this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    *this.done = true;
                    return Poll::Ready(this.aggregator.finish().map(Ok));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
