//! Application-level chat response.

use super::prompt::{AssistantToolCall, ToolResponse};
use crate::types::chat::{ChatCompletion, Choice, Role, Usage};

/// Chat response: one generation per choice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    /// Generations, in choice order.
    pub generations: Vec<Generation>,
    /// Response-level metadata.
    pub metadata: ChatResponseMetadata,
}

impl ChatResponse {
    /// Creates a response.
    pub fn new(generations: Vec<Generation>, metadata: ChatResponseMetadata) -> Self {
        Self {
            generations,
            metadata,
        }
    }

    /// Response with no generations.
    pub fn empty() -> Self {
        Self::default()
    }

    /// First generation.
    pub fn result(&self) -> Option<&Generation> {
        self.generations.first()
    }

    /// Text of the first generation.
    pub fn content(&self) -> Option<&str> {
        self.result().map(|g| g.output.content.as_str())
    }

    /// Returns true if any generation requests tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.generations.iter().any(|g| g.output.has_tool_calls())
    }

    /// Replaces the generations, keeping the metadata.
    #[must_use]
    pub fn with_generations(mut self, generations: Vec<Generation>) -> Self {
        self.generations = generations;
        self
    }
}

/// Response-level metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponseMetadata {
    /// Response ID, empty when the server sent none.
    pub id: String,
    /// Model that served the request, empty when unknown.
    pub model: String,
    /// Token usage, cumulative over tool-calling round trips.
    pub usage: TokenUsage,
    /// Server receive time, epoch seconds; 0 when absent.
    pub created: i64,
}

impl ChatResponseMetadata {
    /// Builds metadata from a completion and the usage to report.
    pub fn from_completion(completion: &ChatCompletion, usage: TokenUsage) -> Self {
        Self {
            id: completion.id.clone().unwrap_or_default(),
            model: completion.model.clone().unwrap_or_default(),
            usage,
            created: completion.created.unwrap_or(0),
        }
    }
}

/// One generated result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    /// Assistant message.
    pub output: AssistantMessage,
    /// Generation metadata.
    pub metadata: GenerationMetadata,
}

impl Generation {
    /// Creates a generation without metadata.
    pub fn new(output: AssistantMessage) -> Self {
        Self {
            output,
            metadata: GenerationMetadata::default(),
        }
    }

    /// Builds the generation for one choice of a completion.
    pub fn from_choice(choice: &Choice, response_id: Option<&str>, role: Option<Role>) -> Self {
        let finish_reason = choice
            .finish_reason
            .map(|r| r.name().to_string())
            .unwrap_or_default();
        let role = role
            .or(choice.message.role)
            .unwrap_or(Role::Assistant);

        let output = AssistantMessage {
            content: choice.message.content.clone().unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls()
                .iter()
                .map(AssistantToolCall::from)
                .collect(),
            properties: MessageProperties {
                id: response_id.unwrap_or_default().to_string(),
                role: role.name().to_string(),
                index: choice.index.unwrap_or(0),
                finish_reason: finish_reason.clone(),
            },
        };

        Self {
            output,
            metadata: GenerationMetadata {
                finish_reason: Some(finish_reason),
                ..GenerationMetadata::default()
            },
        }
    }

    /// Builds a generation carrying a tool's output as the answer.
    pub fn from_tool_response(response: &ToolResponse, finish_reason: &str) -> Self {
        Self {
            output: AssistantMessage::new(response.response_data.clone()),
            metadata: GenerationMetadata {
                finish_reason: Some(finish_reason.to_string()),
                tool_id: response.id.clone(),
                tool_name: Some(response.name.clone()),
            },
        }
    }
}

/// Generation metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationMetadata {
    /// Finish reason name, e.g. `STOP` or `TOOL_CALLS`.
    pub finish_reason: Option<String>,
    /// ID of the tool call whose output this is.
    pub tool_id: Option<String>,
    /// Name of the tool whose output this is.
    pub tool_name: Option<String>,
}

/// Message produced by the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantMessage {
    /// Text content.
    pub content: String,
    /// Requested tool calls.
    pub tool_calls: Vec<AssistantToolCall>,
    /// Where the message came from.
    pub properties: MessageProperties,
}

impl AssistantMessage {
    /// Creates a text-only message.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Creates a message requesting tool calls.
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<AssistantToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            ..Self::default()
        }
    }

    /// Returns true if the message requests tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Response ID, role name, choice index and finish reason of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    /// Response ID.
    pub id: String,
    /// Upper-case role name.
    pub role: String,
    /// Choice index.
    pub index: u32,
    /// Finish reason name, empty when absent.
    pub finish_reason: String,
}

/// Token counts with absent values read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Input tokens.
    pub prompt_tokens: u32,
    /// Output tokens.
    pub completion_tokens: u32,
    /// Total tokens.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Creates a usage record.
    pub fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

impl std::ops::Add for TokenUsage {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(other.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
        }
    }
}

impl From<Option<Usage>> for TokenUsage {
    fn from(usage: Option<Usage>) -> Self {
        let usage = usage.unwrap_or_default();
        let prompt_tokens = usage.prompt_tokens.unwrap_or(0);
        let completion_tokens = usage.completion_tokens.unwrap_or(0);
        let total_tokens = usage
            .total_tokens
            .unwrap_or_else(|| prompt_tokens.saturating_add(completion_tokens));
        Self::new(prompt_tokens, completion_tokens, total_tokens)
    }
}

/// Adds this turn's usage to the running total of the previous turn.
pub fn cumulative_usage(current: TokenUsage, previous: Option<&ChatResponse>) -> TokenUsage {
    match previous {
        Some(previous) => previous.metadata.usage + current,
        None => current,
    }
}
