//! Chat completion wire types.
//!
//! Field names follow the Zhinao JSON API (snake_case). Optional fields are
//! omitted from outgoing JSON when unset.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::tools::{FunctionTool, ToolChoice};
use crate::errors::{ZhinaoError, ZhinaoResult};

/// Model used when neither the request nor the defaults name one.
pub const DEFAULT_CHAT_MODEL: &str = "360gpt-pro";

/// Known Zhinao chat models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatModelId {
    /// `360gpt-pro`.
    #[default]
    GptPro,
}

impl ChatModelId {
    /// Returns the model identifier sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ChatModelId::GptPro => DEFAULT_CHAT_MODEL,
        }
    }
}

impl fmt::Display for ChatModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ChatModelId> for String {
    fn from(model: ChatModelId) -> Self {
        model.as_str().to_string()
    }
}

/// Chat completion request.
///
/// Sampling parameters are passed through as given; the vendor ranges
/// (temperature 0-1, `top_k` 0-1024, ...) are enforced server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model ID.
    pub model: String,

    /// Conversation so far.
    pub messages: Vec<ChatCompletionMessage>,

    /// Whether the response is streamed as server-sent events.
    pub stream: bool,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Maximum number of output tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    /// Top-k sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Repetition penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,

    /// Beam count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_beams: Option<u32>,

    /// Tools the model may call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<FunctionTool>>,

    /// Tool choice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Caller-side user tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatCompletionRequest {
    /// Creates a request for the default model.
    pub fn new(messages: Vec<ChatCompletionMessage>, stream: bool) -> Self {
        Self::with_model(DEFAULT_CHAT_MODEL, messages, stream)
    }

    /// Creates a request for the given model.
    pub fn with_model(
        model: impl Into<String>,
        messages: Vec<ChatCompletionMessage>,
        stream: bool,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            stream,
            temperature: None,
            max_tokens: None,
            top_p: None,
            top_k: None,
            repetition_penalty: None,
            num_beams: None,
            tools: None,
            tool_choice: None,
            user: None,
        }
    }

    /// Sets the temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the max tokens.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the tools and tool choice.
    #[must_use]
    pub fn tools(mut self, tools: Vec<FunctionTool>, tool_choice: Option<ToolChoice>) -> Self {
        self.tools = Some(tools);
        self.tool_choice = tool_choice;
        self
    }

    /// Checks the fields the API cannot do without.
    ///
    /// An empty message list is left for the server to judge.
    pub fn validate(&self) -> ZhinaoResult<()> {
        if self.model.is_empty() {
            return Err(ZhinaoError::invalid_param("Model is required", "model"));
        }
        Ok(())
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt.
    System,
    /// End-user turn.
    User,
    /// Model turn.
    Assistant,
    /// Result of a tool call, built locally from tool output.
    Tool,
}

impl Role {
    /// Upper-case role name used in response metadata.
    pub fn name(self) -> &'static str {
        match self {
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::Tool => "TOOL",
        }
    }
}

/// Chat message, also used as the streamed delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionMessage {
    /// Message role. Absent on most streamed deltas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool name, set on tool-result messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Tool call ID, set on tool-result messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool calls requested by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatCompletionMessage {
    /// Creates a message with a role and text.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message, optionally carrying tool calls.
    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Creates a tool-result message.
    pub fn tool(
        content: impl Into<String>,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// Returns the tool calls, empty when absent.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

/// A tool invocation requested by the model.
///
/// While streaming, only the first fragment of a call carries `id`, `type`
/// and the function name; later fragments carry argument text only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Call type, currently always `function`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Function name and arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<ChatCompletionFunction>,
}

impl ToolCall {
    /// Creates a complete function call.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            type_: Some("function".to_string()),
            function: Some(ChatCompletionFunction {
                name: Some(name.into()),
                arguments: Some(arguments.into()),
            }),
        }
    }

    /// Function name, if known.
    pub fn name(&self) -> Option<&str> {
        self.function.as_ref().and_then(|f| f.name.as_deref())
    }

    /// Raw JSON argument text, if any.
    pub fn arguments(&self) -> Option<&str> {
        self.function.as_ref().and_then(|f| f.arguments.as_deref())
    }
}

/// Function name and raw JSON-encoded arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionFunction {
    /// Function name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Arguments as JSON text (possibly a fragment while streaming).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ChatCompletionFunction {
    /// Parses the arguments as a specific type.
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> ZhinaoResult<T> {
        let raw = self.arguments.as_deref().unwrap_or("{}");
        serde_json::from_str(raw).map_err(|e| {
            ZhinaoError::invalid_param(format!("Failed to parse function arguments: {e}"), "arguments")
        })
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop.
    Stop,
    /// Content filter triggered.
    ContentFilter,
    /// The model is waiting on tool calls.
    ToolCalls,
    /// Any value this client does not know about.
    #[serde(other)]
    Other,
}

impl FinishReason {
    /// Upper-case name used in response metadata.
    pub fn name(self) -> &'static str {
        match self {
            FinishReason::Stop => "STOP",
            FinishReason::ContentFilter => "CONTENT_FILTER",
            FinishReason::ToolCalls => "TOOL_CALLS",
            FinishReason::Other => "OTHER",
        }
    }
}

/// Token usage. Every count may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,

    /// Output tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,

    /// Total tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

impl Usage {
    /// Creates a usage record with all three counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
            total_tokens: Some(total_tokens),
        }
    }
}

/// Non-streamed chat completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// Choices; the API currently returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Choice>>,

    /// Server receive time, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,

    /// Request ID assigned by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Model that served the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Object type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// Token usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Creation time as a UTC timestamp.
    pub fn created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.created
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
    }

    /// Content of the first choice.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .as_deref()
            .and_then(<[Choice]>::first)
            .and_then(|c| c.message.content.as_deref())
    }
}

/// One choice of a non-streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Generated message.
    #[serde(default)]
    pub message: ChatCompletionMessage,

    /// Finish reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Choice index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Streamed completion fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Choices carrying deltas.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,

    /// Server receive time, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,

    /// Request ID assigned by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Model that served the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Object type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// Token usage, usually on the last fragment only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionChunk {
    /// First choice, the only one that takes part in merging.
    pub fn first_choice(&self) -> Option<&ChunkChoice> {
        self.choices.first()
    }

    /// Content delta of the first choice.
    pub fn content(&self) -> Option<&str> {
        self.first_choice()
            .and_then(|c| c.delta.as_ref())
            .and_then(|d| d.content.as_deref())
    }

    /// Tool calls of the first choice's delta, empty when absent.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.first_choice()
            .and_then(|c| c.delta.as_ref())
            .map(ChatCompletionMessage::tool_calls)
            .unwrap_or_default()
    }

    /// Finish reason of the first choice.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.first_choice().and_then(|c| c.finish_reason)
    }

    /// Converts the fragment into the completion shape.
    ///
    /// A missing delta becomes an empty assistant message.
    pub fn into_completion(self) -> ChatCompletion {
        let choices = self
            .choices
            .into_iter()
            .map(|choice| Choice {
                message: choice
                    .delta
                    .unwrap_or_else(|| ChatCompletionMessage::new(Role::Assistant, "")),
                finish_reason: choice.finish_reason,
                index: choice.index,
            })
            .collect();

        ChatCompletion {
            choices: Some(choices),
            created: self.created,
            id: self.id,
            model: self.model,
            object: self.object,
            usage: self.usage,
        }
    }
}

/// One choice of a streamed fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Partial message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<ChatCompletionMessage>,

    /// Finish reason, set on the closing fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Choice index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}
