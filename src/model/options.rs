//! Chat options and their merge rules.

use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::tools::{ToolCallback, ToolContext};
use crate::types::chat::{ChatModelId, DEFAULT_CHAT_MODEL};
use crate::types::tools::{FunctionTool, ToolChoice};

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Options for a Zhinao chat call.
///
/// Every field is optional. Per-call options are layered over the model
/// defaults with [`ZhinaoChatOptions::merge`].
#[derive(Clone, Default)]
pub struct ZhinaoChatOptions {
    /// Model ID.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Maximum output tokens.
    pub max_tokens: Option<u32>,
    /// Nucleus sampling threshold.
    pub top_p: Option<f64>,
    /// Top-k sampling.
    pub top_k: Option<u32>,
    /// Repetition penalty.
    pub repetition_penalty: Option<f64>,
    /// Beam count.
    pub num_beams: Option<u32>,
    /// Tool descriptors sent as is.
    pub tools: Option<Vec<FunctionTool>>,
    /// Tool choice.
    pub tool_choice: Option<ToolChoice>,
    /// Caller-side user tag.
    pub user: Option<String>,

    /// Tools executed locally when the model calls them.
    pub tool_callbacks: Vec<Arc<dyn ToolCallback>>,
    /// Names of tools to look up through the tool resolver.
    pub tool_names: BTreeSet<String>,
    /// Whether tool calls are executed by the model loop. Unset means yes.
    pub internal_tool_execution_enabled: Option<bool>,
    /// Context passed to every tool invocation.
    pub tool_context: ToolContext,
}

impl ZhinaoChatOptions {
    /// Defaults used when nothing is configured: `360gpt-pro` at 0.7.
    pub fn defaults() -> Self {
        Self {
            model: Some(DEFAULT_CHAT_MODEL.to_string()),
            temperature: Some(DEFAULT_TEMPERATURE),
            ..Self::default()
        }
    }

    /// Sets the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the model from a known model ID.
    #[must_use]
    pub fn model_id(self, model: ChatModelId) -> Self {
        self.model(model)
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

    /// Sets top-p.
    #[must_use]
    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Sets top-k.
    #[must_use]
    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Sets the repetition penalty.
    #[must_use]
    pub fn repetition_penalty(mut self, penalty: f64) -> Self {
        self.repetition_penalty = Some(penalty);
        self
    }

    /// Sets the beam count.
    #[must_use]
    pub fn num_beams(mut self, num_beams: u32) -> Self {
        self.num_beams = Some(num_beams);
        self
    }

    /// Sets the tool descriptors.
    #[must_use]
    pub fn tools(mut self, tools: Vec<FunctionTool>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Sets the tool choice.
    #[must_use]
    pub fn tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    /// Sets the user tag.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the locally executed tools.
    #[must_use]
    pub fn tool_callbacks(mut self, callbacks: Vec<Arc<dyn ToolCallback>>) -> Self {
        self.tool_callbacks = callbacks;
        self
    }

    /// Sets the names of tools to resolve.
    #[must_use]
    pub fn tool_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables tool execution by the model loop.
    #[must_use]
    pub fn internal_tool_execution_enabled(mut self, enabled: bool) -> Self {
        self.internal_tool_execution_enabled = Some(enabled);
        self
    }

    /// Sets the tool context.
    #[must_use]
    pub fn tool_context<I>(mut self, context: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.tool_context = context.into_iter().collect();
        self
    }

    /// Layers `runtime` over `defaults`.
    ///
    /// - Request fields: the runtime value wins when set.
    /// - `internal_tool_execution_enabled`: first set value, runtime first.
    /// - `tool_names`: union.
    /// - `tool_callbacks`: union by tool name; a runtime callback replaces a
    ///   default one of the same name.
    /// - `tool_context`: merged key by key, runtime entries win.
    pub fn merge(runtime: Option<&ZhinaoChatOptions>, defaults: &ZhinaoChatOptions) -> ZhinaoChatOptions {
        let Some(runtime) = runtime else {
            return defaults.clone();
        };

        let mut tool_callbacks = runtime.tool_callbacks.clone();
        let runtime_names: BTreeSet<String> =
            runtime.tool_callbacks.iter().map(|cb| cb.definition().name).collect();
        tool_callbacks.extend(
            defaults
                .tool_callbacks
                .iter()
                .filter(|cb| !runtime_names.contains(&cb.definition().name))
                .cloned(),
        );

        let mut tool_context = defaults.tool_context.clone();
        tool_context.extend(runtime.tool_context.iter().map(|(k, v)| (k.clone(), v.clone())));

        ZhinaoChatOptions {
            model: runtime.model.clone().or_else(|| defaults.model.clone()),
            temperature: runtime.temperature.or(defaults.temperature),
            max_tokens: runtime.max_tokens.or(defaults.max_tokens),
            top_p: runtime.top_p.or(defaults.top_p),
            top_k: runtime.top_k.or(defaults.top_k),
            repetition_penalty: runtime.repetition_penalty.or(defaults.repetition_penalty),
            num_beams: runtime.num_beams.or(defaults.num_beams),
            tools: runtime.tools.clone().or_else(|| defaults.tools.clone()),
            tool_choice: runtime.tool_choice.clone().or_else(|| defaults.tool_choice.clone()),
            user: runtime.user.clone().or_else(|| defaults.user.clone()),
            tool_callbacks,
            tool_names: runtime.tool_names.union(&defaults.tool_names).cloned().collect(),
            internal_tool_execution_enabled: runtime
                .internal_tool_execution_enabled
                .or(defaults.internal_tool_execution_enabled),
            tool_context,
        }
    }
}

impl fmt::Debug for ZhinaoChatOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callback_names: Vec<String> =
            self.tool_callbacks.iter().map(|cb| cb.definition().name).collect();
        f.debug_struct("ZhinaoChatOptions")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("repetition_penalty", &self.repetition_penalty)
            .field("num_beams", &self.num_beams)
            .field("tools", &self.tools)
            .field("tool_choice", &self.tool_choice)
            .field("user", &self.user)
            .field("tool_callbacks", &callback_names)
            .field("tool_names", &self.tool_names)
            .field("internal_tool_execution_enabled", &self.internal_tool_execution_enabled)
            .field("tool_context", &self.tool_context)
            .finish()
    }
}
