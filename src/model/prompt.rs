//! Application-level prompt.

use super::options::ZhinaoChatOptions;
use super::response::AssistantMessage;
use crate::types::chat::ToolCall;

/// Messages plus optional per-call options.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    /// Conversation, oldest first.
    pub messages: Vec<PromptMessage>,
    /// Options overriding the model defaults for this call.
    pub options: Option<ZhinaoChatOptions>,
}

impl Prompt {
    /// Creates a prompt without options.
    pub fn new(messages: Vec<PromptMessage>) -> Self {
        Self {
            messages,
            options: None,
        }
    }

    /// Creates a prompt holding a single user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(vec![PromptMessage::user(content)])
    }

    /// Sets the per-call options.
    #[must_use]
    pub fn with_options(mut self, options: ZhinaoChatOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// One message of a prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptMessage {
    /// System instructions.
    System(String),
    /// End-user turn.
    User(String),
    /// Earlier model turn, possibly with tool calls.
    Assistant(AssistantMessage),
    /// Results of the tool calls of the previous assistant turn.
    ToolResponse(Vec<ToolResponse>),
    /// A message kind Zhinao has no role for. Rejected when the request is
    /// built.
    Other {
        /// Name of the message kind.
        kind: String,
        /// Message text.
        text: String,
    },
}

impl PromptMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    /// Creates an assistant message without tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(AssistantMessage::new(content))
    }

    /// Name of the message kind, for diagnostics.
    pub fn kind(&self) -> &str {
        match self {
            Self::System(_) => "system",
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::ToolResponse(_) => "tool",
            Self::Other { kind, .. } => kind,
        }
    }
}

/// Tool call carried by an assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantToolCall {
    /// Call ID.
    pub id: String,
    /// Call type, `function`.
    pub type_: String,
    /// Function name.
    pub name: String,
    /// Raw JSON arguments.
    pub arguments: String,
}

impl AssistantToolCall {
    /// Creates a function call.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            type_: "function".to_string(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Converts to the wire form.
    pub fn to_wire(&self) -> ToolCall {
        let mut call = ToolCall::function(&self.id, &self.name, &self.arguments);
        call.type_ = Some(self.type_.clone());
        call
    }
}

impl From<&ToolCall> for AssistantToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone().unwrap_or_default(),
            type_: call.type_.clone().unwrap_or_else(|| "function".to_string()),
            name: call.name().unwrap_or_default().to_string(),
            arguments: call.arguments().unwrap_or_default().to_string(),
        }
    }
}

/// Output of one executed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResponse {
    /// ID of the tool call this answers. Required to build a request.
    pub id: Option<String>,
    /// Tool name.
    pub name: String,
    /// Tool output.
    pub response_data: String,
}

impl ToolResponse {
    /// Creates a tool response.
    pub fn new(id: Option<String>, name: impl Into<String>, response_data: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            response_data: response_data.into(),
        }
    }
}
