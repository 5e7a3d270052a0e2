//! Local tool execution.
//!
//! Tools are described to the model with a [`ToolDefinition`] and executed
//! through a [`ToolCallback`]. The [`ToolCallingManager`] turns the tool
//! calls in a model response into tool-response messages appended to the
//! conversation.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::options::ZhinaoChatOptions;
use super::prompt::{Prompt, PromptMessage, ToolResponse};
use super::response::{ChatResponse, Generation};
use crate::errors::{ZhinaoError, ZhinaoResult};
use crate::types::tools::{FunctionDefinition, FunctionTool};

/// Free-form context handed to every tool invocation.
pub type ToolContext = HashMap<String, Value>;

/// Description of a tool the model may call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    /// Tool name, unique among the tools of one request.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON Schema of the arguments.
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Creates a tool definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Converts to the descriptor sent on the wire.
    pub fn to_function_tool(&self) -> FunctionTool {
        FunctionTool::new(FunctionDefinition::new(
            self.name.clone(),
            self.description.clone(),
            self.input_schema.clone(),
        ))
    }
}

/// A locally executable tool.
#[cfg_attr(test, mockall::automock)]
pub trait ToolCallback: Send + Sync {
    /// Definition advertised to the model.
    fn definition(&self) -> ToolDefinition;

    /// Whether the tool output is returned to the caller instead of being
    /// sent back to the model.
    fn return_direct(&self) -> bool {
        false
    }

    /// Runs the tool with raw JSON arguments and returns its output text.
    fn call(&self, arguments: &str, context: &ToolContext) -> ZhinaoResult<String>;
}

impl fmt::Debug for dyn ToolCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCallback")
            .field("name", &self.definition().name)
            .finish_non_exhaustive()
    }
}

/// Tool backed by a closure.
pub struct FunctionToolCallback<F> {
    definition: ToolDefinition,
    return_direct: bool,
    function: F,
}

impl<F> FunctionToolCallback<F>
where
    F: Fn(&str, &ToolContext) -> ZhinaoResult<String> + Send + Sync,
{
    /// Creates a tool that runs `function` with the raw JSON arguments.
    pub fn new(definition: ToolDefinition, function: F) -> Self {
        Self {
            definition,
            return_direct: false,
            function,
        }
    }

    /// Marks the tool output as the final answer.
    #[must_use]
    pub fn return_direct(mut self, return_direct: bool) -> Self {
        self.return_direct = return_direct;
        self
    }
}

impl<F> ToolCallback for FunctionToolCallback<F>
where
    F: Fn(&str, &ToolContext) -> ZhinaoResult<String> + Send + Sync,
{
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn return_direct(&self) -> bool {
        self.return_direct
    }

    fn call(&self, arguments: &str, context: &ToolContext) -> ZhinaoResult<String> {
        (self.function)(arguments, context)
    }
}

/// Looks up tool callbacks by name.
pub trait ToolCallbackResolver: Send + Sync {
    /// Returns the callback registered under `name`.
    fn resolve(&self, name: &str) -> Option<Arc<dyn ToolCallback>>;
}

/// Resolver over a fixed set of callbacks.
#[derive(Default)]
pub struct StaticToolCallbackResolver {
    callbacks: HashMap<String, Arc<dyn ToolCallback>>,
}

impl StaticToolCallbackResolver {
    /// Creates a resolver. Later callbacks replace earlier ones of the same name.
    pub fn new(callbacks: impl IntoIterator<Item = Arc<dyn ToolCallback>>) -> Self {
        let callbacks = callbacks
            .into_iter()
            .map(|cb| (cb.definition().name, cb))
            .collect();
        Self { callbacks }
    }
}

impl ToolCallbackResolver for StaticToolCallbackResolver {
    fn resolve(&self, name: &str) -> Option<Arc<dyn ToolCallback>> {
        self.callbacks.get(name).cloned()
    }
}

/// Fails if two callbacks share a name.
pub fn validate_tool_callbacks(callbacks: &[Arc<dyn ToolCallback>]) -> ZhinaoResult<()> {
    let mut seen = HashSet::new();
    let mut duplicates: Vec<String> = callbacks
        .iter()
        .map(|cb| cb.definition().name)
        .filter(|name| !seen.insert(name.clone()))
        .collect();

    if duplicates.is_empty() {
        return Ok(());
    }

    duplicates.sort();
    duplicates.dedup();
    Err(ZhinaoError::invalid_param(
        format!(
            "Multiple tools with the same name ({}) found in tool callbacks",
            duplicates.join(", ")
        ),
        "tool_callbacks",
    ))
}

/// Outcome of running the tools requested in one response.
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    /// Conversation so far, ending with the assistant tool-call message
    /// and the tool responses.
    pub conversation_history: Vec<PromptMessage>,
    /// True when every executed tool asked for its output to be returned
    /// directly.
    pub return_direct: bool,
}

impl ToolExecutionResult {
    /// Finish reason tagged on generations built from tool output.
    pub const FINISH_REASON: &'static str = "returnDirect";

    /// Tool responses of the last message in the history.
    pub fn tool_responses(&self) -> &[ToolResponse] {
        match self.conversation_history.last() {
            Some(PromptMessage::ToolResponse(responses)) => responses,
            _ => &[],
        }
    }

    /// One generation per tool response, for returning tool output directly.
    pub fn build_generations(&self) -> Vec<Generation> {
        self.tool_responses()
            .iter()
            .map(|response| Generation::from_tool_response(response, Self::FINISH_REASON))
            .collect()
    }
}

/// Resolves tool definitions and executes tool calls.
pub trait ToolCallingManager: Send + Sync {
    /// Definitions of every tool enabled by the options.
    fn resolve_tool_definitions(&self, options: &ZhinaoChatOptions) -> ZhinaoResult<Vec<ToolDefinition>>;

    /// Executes the tool calls of the first generation that has any.
    fn execute_tool_calls(&self, prompt: &Prompt, response: &ChatResponse) -> ZhinaoResult<ToolExecutionResult>;
}

/// Manager that looks tools up in the options first, then in a resolver.
#[derive(Default)]
pub struct DefaultToolCallingManager {
    resolver: Option<Arc<dyn ToolCallbackResolver>>,
}

impl DefaultToolCallingManager {
    /// Creates a manager using only the callbacks carried by the options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager that also consults `resolver` for named tools.
    pub fn with_resolver(resolver: Arc<dyn ToolCallbackResolver>) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }

    fn lookup(&self, options: &ZhinaoChatOptions, name: &str) -> Option<Arc<dyn ToolCallback>> {
        options
            .tool_callbacks
            .iter()
            .find(|cb| cb.definition().name == name)
            .cloned()
            .or_else(|| self.resolver.as_ref().and_then(|r| r.resolve(name)))
    }
}

impl fmt::Debug for DefaultToolCallingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultToolCallingManager")
            .field("has_resolver", &self.resolver.is_some())
            .finish()
    }
}

impl ToolCallingManager for DefaultToolCallingManager {
    fn resolve_tool_definitions(&self, options: &ZhinaoChatOptions) -> ZhinaoResult<Vec<ToolDefinition>> {
        let mut definitions: Vec<ToolDefinition> =
            options.tool_callbacks.iter().map(|cb| cb.definition()).collect();

        for name in &options.tool_names {
            if definitions.iter().any(|d| &d.name == name) {
                continue;
            }
            let callback = self
                .resolver
                .as_ref()
                .and_then(|r| r.resolve(name))
                .ok_or_else(|| {
                    ZhinaoError::invalid_param(format!("No ToolCallback found for tool name: {name}"), "tool_names")
                })?;
            definitions.push(callback.definition());
        }

        Ok(definitions)
    }

    fn execute_tool_calls(&self, prompt: &Prompt, response: &ChatResponse) -> ZhinaoResult<ToolExecutionResult> {
        let generation = response
            .generations
            .iter()
            .find(|g| g.output.has_tool_calls())
            .ok_or_else(|| ZhinaoError::invalid_argument("No tool call requested by the chat model"))?;

        let default_options = ZhinaoChatOptions::default();
        let options = prompt.options.as_ref().unwrap_or(&default_options);

        let mut responses = Vec::with_capacity(generation.output.tool_calls.len());
        let mut return_direct: Option<bool> = None;

        for call in &generation.output.tool_calls {
            let callback = self.lookup(options, &call.name).ok_or_else(|| {
                ZhinaoError::invalid_param(format!("No ToolCallback found for tool name: {}", call.name), "tool_calls")
            })?;

            let arguments = if call.arguments.trim().is_empty() {
                "{}"
            } else {
                call.arguments.as_str()
            };

            debug!(tool = %call.name, id = %call.id, "Executing tool call");
            let output = callback
                .call(arguments, &options.tool_context)
                .map_err(|e| match e {
                    ZhinaoError::ToolExecution { .. } => e,
                    other => ZhinaoError::tool_execution(&call.name, other.to_string()),
                })?;

            return_direct = Some(return_direct.unwrap_or(true) && callback.return_direct());
            responses.push(ToolResponse::new(Some(call.id.clone()), call.name.clone(), output));
        }

        let mut conversation_history = prompt.messages.clone();
        conversation_history.push(PromptMessage::Assistant(generation.output.clone()));
        conversation_history.push(PromptMessage::ToolResponse(responses));

        Ok(ToolExecutionResult {
            conversation_history,
            return_direct: return_direct.unwrap_or(false),
        })
    }
}

/// Decides whether a response needs local tool execution.
pub trait ToolExecutionEligibilityPredicate: Send + Sync {
    /// Returns true if the tools requested in `response` should be run.
    fn is_tool_execution_required(&self, options: &ZhinaoChatOptions, response: &ChatResponse) -> bool;
}

/// Requires internal tool execution to be enabled (the default) and at
/// least one generation with tool calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultToolExecutionEligibilityPredicate;

impl ToolExecutionEligibilityPredicate for DefaultToolExecutionEligibilityPredicate {
    fn is_tool_execution_required(&self, options: &ZhinaoChatOptions, response: &ChatResponse) -> bool {
        options.internal_tool_execution_enabled.unwrap_or(true) && response.has_tool_calls()
    }
}
