//! Folding of a streamed response into one.

use futures::{Stream, StreamExt};

use super::prompt::AssistantToolCall;
use super::response::{
    AssistantMessage, ChatResponse, ChatResponseMetadata, Generation, GenerationMetadata,
    MessageProperties, TokenUsage,
};
use crate::errors::ZhinaoResult;

/// Accumulates streamed responses into a single response.
///
/// Text is concatenated, tool calls are collected in order, and metadata
/// fields take the last non-empty value seen.
#[derive(Debug, Default)]
pub struct MessageAggregator {
    content: String,
    tool_calls: Vec<AssistantToolCall>,
    properties: MessageProperties,
    generation_metadata: GenerationMetadata,
    metadata: ChatResponseMetadata,
}

impl MessageAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one streamed response. Only its first generation is read.
    pub fn add(&mut self, response: &ChatResponse) {
        if let Some(generation) = response.result() {
            let output = &generation.output;
            self.content.push_str(&output.content);
            self.tool_calls.extend(output.tool_calls.iter().cloned());

            let props = &output.properties;
            if !props.id.is_empty() {
                self.properties.id.clone_from(&props.id);
            }
            if !props.role.is_empty() {
                self.properties.role.clone_from(&props.role);
            }
            self.properties.index = props.index;
            if !props.finish_reason.is_empty() {
                self.properties.finish_reason.clone_from(&props.finish_reason);
            }

            let meta = &generation.metadata;
            if meta.finish_reason.as_deref().is_some_and(|r| !r.is_empty()) {
                self.generation_metadata.finish_reason.clone_from(&meta.finish_reason);
            }
            if meta.tool_id.is_some() {
                self.generation_metadata.tool_id.clone_from(&meta.tool_id);
            }
            if meta.tool_name.is_some() {
                self.generation_metadata.tool_name.clone_from(&meta.tool_name);
            }
        }

        let metadata = &response.metadata;
        if !metadata.id.is_empty() {
            self.metadata.id.clone_from(&metadata.id);
        }
        if !metadata.model.is_empty() {
            self.metadata.model.clone_from(&metadata.model);
        }
        if metadata.created != 0 {
            self.metadata.created = metadata.created;
        }
        self.metadata.usage = latest_usage(self.metadata.usage, metadata.usage);
    }

    /// Returns the aggregated response.
    pub fn build(self) -> ChatResponse {
        let output = AssistantMessage {
            content: self.content,
            tool_calls: self.tool_calls,
            properties: self.properties,
        };

        ChatResponse::new(
            vec![Generation {
                output,
                metadata: self.generation_metadata,
            }],
            self.metadata,
        )
    }
}

/// Each count takes the latest non-zero value.
fn latest_usage(previous: TokenUsage, current: TokenUsage) -> TokenUsage {
    let pick = |prev: u32, cur: u32| if cur > 0 { cur } else { prev };
    TokenUsage::new(
        pick(previous.prompt_tokens, current.prompt_tokens),
        pick(previous.completion_tokens, current.completion_tokens),
        pick(previous.total_tokens, current.total_tokens),
    )
}

/// Drains a response stream into one aggregated response.
///
/// # Errors
///
/// Returns the first error produced by the stream.
pub async fn aggregate<S>(stream: S) -> ZhinaoResult<ChatResponse>
where
    S: Stream<Item = ZhinaoResult<ChatResponse>>,
{
    let mut aggregator = MessageAggregator::new();
    futures::pin_mut!(stream);
    while let Some(response) = stream.next().await {
        aggregator.add(&response?);
    }
    Ok(aggregator.build())
}
