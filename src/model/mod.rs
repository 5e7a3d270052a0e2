//! Zhinao chat model.
//!
//! [`ZhinaoChatModel`] turns a [`Prompt`] into a wire request, sends it
//! through [`ChatService`], and maps the completion back into a
//! [`ChatResponse`]. When the model asks for tools and tool execution is
//! enabled, the tools are run locally and the conversation continues until
//! the model stops asking.

mod aggregator;
mod options;
mod prompt;
mod response;
mod tools;

pub use aggregator::{aggregate, MessageAggregator};
pub use options::{ZhinaoChatOptions, DEFAULT_TEMPERATURE};
pub use prompt::{AssistantToolCall, Prompt, PromptMessage, ToolResponse};
pub use response::{
    cumulative_usage, AssistantMessage, ChatResponse, ChatResponseMetadata, Generation,
    GenerationMetadata, MessageProperties, TokenUsage,
};
pub use tools::{
    validate_tool_callbacks, DefaultToolCallingManager, DefaultToolExecutionEligibilityPredicate,
    FunctionToolCallback, StaticToolCallbackResolver, ToolCallback, ToolCallbackResolver,
    ToolCallingManager, ToolContext, ToolDefinition, ToolExecutionEligibilityPredicate,
    ToolExecutionResult,
};

use async_stream::try_stream;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::errors::{ZhinaoError, ZhinaoResult};
use crate::resilience::RetryPolicy;
use crate::services::ChatService;
use crate::types::chat::{
    ChatCompletion, ChatCompletionMessage, ChatCompletionRequest, Role, DEFAULT_CHAT_MODEL,
};

/// Chat model backed by the Zhinao API.
pub struct ZhinaoChatModel {
    chat_service: Arc<ChatService>,
    default_options: ZhinaoChatOptions,
    retry_policy: RetryPolicy,
    tool_calling_manager: Arc<dyn ToolCallingManager>,
    tool_execution_eligibility_predicate: Arc<dyn ToolExecutionEligibilityPredicate>,
}

impl ZhinaoChatModel {
    /// Creates a chat model with the default retry policy and tool handling.
    pub fn new(chat_service: Arc<ChatService>, default_options: ZhinaoChatOptions) -> Self {
        Self {
            chat_service,
            default_options,
            retry_policy: RetryPolicy::default(),
            tool_calling_manager: Arc::new(DefaultToolCallingManager::new()),
            tool_execution_eligibility_predicate: Arc::new(DefaultToolExecutionEligibilityPredicate),
        }
    }

    /// Sets the retry policy for blocking calls.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sets the tool calling manager.
    #[must_use]
    pub fn with_tool_calling_manager(mut self, manager: Arc<dyn ToolCallingManager>) -> Self {
        self.tool_calling_manager = manager;
        self
    }

    /// Sets the predicate deciding when tools are executed.
    #[must_use]
    pub fn with_tool_execution_eligibility_predicate(
        mut self,
        predicate: Arc<dyn ToolExecutionEligibilityPredicate>,
    ) -> Self {
        self.tool_execution_eligibility_predicate = predicate;
        self
    }

    /// Returns the default options.
    pub fn default_options(&self) -> &ZhinaoChatOptions {
        &self.default_options
    }

    /// Merges the prompt's options over the defaults.
    ///
    /// # Errors
    ///
    /// Fails if two tool callbacks share a name.
    pub fn build_request_prompt(&self, prompt: Prompt) -> ZhinaoResult<Prompt> {
        let options = ZhinaoChatOptions::merge(prompt.options.as_ref(), &self.default_options);
        validate_tool_callbacks(&options.tool_callbacks)?;

        Ok(Prompt {
            messages: prompt.messages,
            options: Some(options),
        })
    }

    /// Builds the wire request for a prompt.
    ///
    /// # Errors
    ///
    /// Fails if a tool response has no call ID, if the prompt holds an
    /// unsupported message kind, or if a named tool cannot be resolved.
    pub fn create_request(&self, prompt: &Prompt, stream: bool) -> ZhinaoResult<ChatCompletionRequest> {
        let mut messages = Vec::with_capacity(prompt.messages.len());
        for message in &prompt.messages {
            match message {
                PromptMessage::System(text) => messages.push(ChatCompletionMessage::system(text.clone())),
                PromptMessage::User(text) => messages.push(ChatCompletionMessage::user(text.clone())),
                PromptMessage::Assistant(assistant) => {
                    let tool_calls = (!assistant.tool_calls.is_empty())
                        .then(|| assistant.tool_calls.iter().map(AssistantToolCall::to_wire).collect());
                    messages.push(ChatCompletionMessage::assistant(assistant.content.clone(), tool_calls));
                }
                PromptMessage::ToolResponse(responses) => {
                    for response in responses {
                        let id = response.id.clone().ok_or_else(|| {
                            ZhinaoError::invalid_param("ToolResponseMessage must have an id", "tool_call_id")
                        })?;
                        messages.push(ChatCompletionMessage::tool(
                            response.response_data.clone(),
                            response.name.clone(),
                            id,
                        ));
                    }
                }
                PromptMessage::Other { kind, .. } => {
                    return Err(ZhinaoError::invalid_argument(format!("Unsupported message type: {kind}")));
                }
            }
        }

        let options = self.options_of(prompt);
        let model = options.model.clone().unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());

        let mut request = ChatCompletionRequest::with_model(model, messages, stream);
        request.temperature = options.temperature;
        request.max_tokens = options.max_tokens;
        request.top_p = options.top_p;
        request.top_k = options.top_k;
        request.repetition_penalty = options.repetition_penalty;
        request.num_beams = options.num_beams;
        request.tools = options.tools.clone();
        request.tool_choice = options.tool_choice.clone();
        request.user = options.user.clone();

        let definitions = self.tool_calling_manager.resolve_tool_definitions(options)?;
        if !definitions.is_empty() {
            let tools = request.tools.get_or_insert_with(Vec::new);
            for definition in definitions {
                let tool = definition.to_function_tool();
                match tools.iter_mut().find(|t| t.name() == tool.name()) {
                    Some(slot) => *slot = tool,
                    None => tools.push(tool),
                }
            }
        }

        Ok(request)
    }

    /// Sends the prompt and returns the model's answer, running requested
    /// tools in between when tool execution is enabled.
    ///
    /// # Errors
    ///
    /// Returns usage errors immediately and transport or API errors once the
    /// retry policy gives up.
    #[instrument(skip(self, prompt), fields(messages = prompt.messages.len()))]
    pub async fn call(&self, prompt: Prompt) -> ZhinaoResult<ChatResponse> {
        let prompt = self.build_request_prompt(prompt)?;
        self.internal_call(prompt, None).await
    }

    fn internal_call(&self, prompt: Prompt, previous: Option<ChatResponse>) -> BoxFuture<'_, ZhinaoResult<ChatResponse>> {
        Box::pin(async move {
            let request = self.create_request(&prompt, false)?;

            let completion = self
                .retry_policy
                .execute(|| self.chat_service.create(&request))
                .await?;

            let Some(completion) = completion else {
                warn!(messages = prompt.messages.len(), "No chat completion returned for prompt");
                return Ok(ChatResponse::empty());
            };
            let Some(choices) = completion.choices.as_deref() else {
                warn!(id = ?completion.id, "No choices returned for prompt");
                return Ok(ChatResponse::empty());
            };

            let generations = choices
                .iter()
                .map(|choice| Generation::from_choice(choice, completion.id.as_deref(), None))
                .collect();
            let response = build_response(&completion, generations, previous.as_ref());

            let options = self.options_of(&prompt);
            if !self
                .tool_execution_eligibility_predicate
                .is_tool_execution_required(options, &response)
            {
                return Ok(response);
            }

            let result = self.tool_calling_manager.execute_tool_calls(&prompt, &response)?;
            if result.return_direct {
                debug!("Returning tool output directly");
                return Ok(response.with_generations(result.build_generations()));
            }

            let next = Prompt {
                messages: result.conversation_history,
                options: Some(options.clone()),
            };
            self.internal_call(next, Some(response)).await
        })
    }

    /// Streams the model's answer.
    ///
    /// Streamed tool calls arrive reassembled. When tools are executed, the
    /// continuation of the conversation is streamed after the tool-call
    /// response. Errors end the stream.
    pub fn stream(&self, prompt: Prompt) -> BoxStream<'_, ZhinaoResult<ChatResponse>> {
        match self.build_request_prompt(prompt) {
            Ok(prompt) => self.internal_stream(prompt, None),
            Err(e) => futures::stream::once(async move { Err(e) }).boxed(),
        }
    }

    fn internal_stream(&self, prompt: Prompt, previous: Option<ChatResponse>) -> BoxStream<'_, ZhinaoResult<ChatResponse>> {
        self.response_stream(prompt, previous).boxed()
    }

    fn response_stream(
        &self,
        prompt: Prompt,
        previous: Option<ChatResponse>,
    ) -> impl Stream<Item = ZhinaoResult<ChatResponse>> + Send + '_ {
        try_stream! {
            let request = self.create_request(&prompt, true)?;
            let mut chunks = self.chat_service.create_stream(&request).await?;

            // First role seen per response ID.
            let mut roles: HashMap<String, Role> = HashMap::new();

            while let Some(chunk) = chunks.next().await {
                let completion = chunk?.into_completion();
                let id = completion.id.clone().unwrap_or_default();

                let generations = completion
                    .choices
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(|choice| {
                        if let Some(role) = choice.message.role {
                            roles.entry(id.clone()).or_insert(role);
                        }
                        Generation::from_choice(choice, Some(id.as_str()), roles.get(&id).copied())
                    })
                    .collect();
                let response = build_response(&completion, generations, previous.as_ref());

                let options = self.options_of(&prompt);
                if !self
                    .tool_execution_eligibility_predicate
                    .is_tool_execution_required(options, &response)
                {
                    yield response;
                    continue;
                }

                let result = self.tool_calling_manager.execute_tool_calls(&prompt, &response)?;
                if result.return_direct {
                    yield response.with_generations(result.build_generations());
                    continue;
                }

                let next = Prompt {
                    messages: result.conversation_history,
                    options: Some(options.clone()),
                };
                let mut continuation = self.internal_stream(next, Some(response));
                while let Some(item) = continuation.next().await {
                    yield item?;
                }
            }
        }
    }

    fn options_of<'a>(&'a self, prompt: &'a Prompt) -> &'a ZhinaoChatOptions {
        prompt.options.as_ref().unwrap_or(&self.default_options)
    }
}

impl std::fmt::Debug for ZhinaoChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZhinaoChatModel")
            .field("chat_service", &self.chat_service)
            .field("default_options", &self.default_options)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

fn build_response(
    completion: &ChatCompletion,
    generations: Vec<Generation>,
    previous: Option<&ChatResponse>,
) -> ChatResponse {
    let usage = cumulative_usage(TokenUsage::from(completion.usage), previous);
    ChatResponse::new(generations, ChatResponseMetadata::from_completion(completion, usage))
}

#[cfg(test)]
mod tests;
