//! Reassembly of streamed tool calls.
//!
//! Zhinao splits a tool call's JSON arguments over several streamed chunks.
//! [`ToolCallAggregator`] windows the chunk stream and folds each window
//! into one chunk with the complete call, using [`merge_chunks`].

mod aggregator;
mod merge;

pub use aggregator::{MergedChunkStream, ToolCallAggregator};
pub use merge::{
    is_streaming_tool_function_call, is_streaming_tool_function_call_finish, merge_chunks,
};
