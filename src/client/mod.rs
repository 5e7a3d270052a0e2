//! Zhinao API client.
//!
//! Wires configuration, authentication, transport, and retry policy into a
//! [`ChatService`] and a [`ZhinaoChatModel`].

use std::sync::Arc;

use crate::auth::{ApiKeyAuth, AuthProvider};
use crate::config::{ZhinaoConfig, ZhinaoConfigBuilder};
use crate::errors::{ZhinaoError, ZhinaoResult};
use crate::model::{
    DefaultToolCallingManager, ToolCallbackResolver, ToolCallingManager,
    ToolExecutionEligibilityPredicate, ZhinaoChatModel, ZhinaoChatOptions,
};
use crate::resilience::{RetryConfig, RetryPolicy};
use crate::services::ChatService;
use crate::transport::{HttpTransport, HttpTransportImpl};

/// The main Zhinao client.
///
/// # Example
///
/// ```rust,no_run
/// use zhinao_client::{Prompt, ZhinaoClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ZhinaoClient::builder()
///         .api_key("your-api-key")
///         .build()?;
///
///     let response = client.chat_model().call(Prompt::user("Hello, Zhinao!")).await?;
///     println!("{}", response.content().unwrap_or_default());
///     Ok(())
/// }
/// ```
pub struct ZhinaoClient {
    config: ZhinaoConfig,
    chat_service: Arc<ChatService>,
    chat_model: ZhinaoChatModel,
}

impl ZhinaoClient {
    /// Starts an empty builder.
    pub fn builder() -> ZhinaoClientBuilder {
        ZhinaoClientBuilder::new()
    }

    /// Builds a client from `ZHINAO_*` environment variables.
    ///
    /// See [`ZhinaoConfig::from_env`] for the variables read.
    pub fn from_env() -> ZhinaoResult<Self> {
        let config = ZhinaoConfig::from_env()?;
        ZhinaoClientBuilder::from_config(config).build()
    }

    /// Builds a client for the public endpoint with `api_key`.
    pub fn from_api_key(api_key: impl Into<String>) -> ZhinaoResult<Self> {
        ZhinaoClientBuilder::new().api_key(api_key).build()
    }

    /// Returns the low-level chat completions service.
    pub fn chat(&self) -> &ChatService {
        &self.chat_service
    }

    /// Returns the chat model.
    pub fn chat_model(&self) -> &ZhinaoChatModel {
        &self.chat_model
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &ZhinaoConfig {
        &self.config
    }
}

impl std::fmt::Debug for ZhinaoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZhinaoClient")
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for the Zhinao client.
#[derive(Default)]
pub struct ZhinaoClientBuilder {
    config_builder: ZhinaoConfigBuilder,
    config: Option<ZhinaoConfig>,
    transport: Option<Arc<dyn HttpTransport>>,
    auth: Option<Arc<dyn AuthProvider>>,
    retry_config: Option<RetryConfig>,
    tool_calling_manager: Option<Arc<dyn ToolCallingManager>>,
    tool_callback_resolver: Option<Arc<dyn ToolCallbackResolver>>,
    tool_execution_eligibility_predicate: Option<Arc<dyn ToolExecutionEligibilityPredicate>>,
}

impl ZhinaoClientBuilder {
    /// Starts an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder seeded with `config`.
    ///
    /// Configuration setters on the builder are ignored afterwards.
    pub fn from_config(config: ZhinaoConfig) -> Self {
        Self {
            config: Some(config),
            ..Self::default()
        }
    }

    /// API key sent as a bearer token.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.api_key(api_key);
        self
    }

    /// Scheme and host of the API.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(base_url);
        self
    }

    /// Sets the completions endpoint path.
    pub fn completions_path(mut self, path: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.completions_path(path);
        self
    }

    /// Per-request timeout.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Retries for blocking completions.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config_builder = self.config_builder.max_retries(retries);
        self
    }

    /// Adds a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.header(name, value);
        self
    }

    /// Sets the default chat options.
    pub fn default_options(mut self, options: ZhinaoChatOptions) -> Self {
        self.config_builder = self.config_builder.default_options(options);
        self
    }

    /// Replaces the reqwest transport, e.g. with a mock.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces bearer-key authentication.
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets the retry configuration, replacing the one derived from
    /// `max_retries`.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    /// Sets a custom tool calling manager.
    pub fn tool_calling_manager(mut self, manager: Arc<dyn ToolCallingManager>) -> Self {
        self.tool_calling_manager = Some(manager);
        self
    }

    /// Sets the resolver used by the default tool calling manager to find
    /// tools named in `tool_names`.
    pub fn tool_callback_resolver(mut self, resolver: Arc<dyn ToolCallbackResolver>) -> Self {
        self.tool_callback_resolver = Some(resolver);
        self
    }

    /// Sets the predicate deciding when tools are executed.
    pub fn tool_execution_eligibility_predicate(
        mut self,
        predicate: Arc<dyn ToolExecutionEligibilityPredicate>,
    ) -> Self {
        self.tool_execution_eligibility_predicate = Some(predicate);
        self
    }

    /// Validates the configuration and wires the client together.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or if the HTTP client cannot be
    /// created.
    pub fn build(self) -> ZhinaoResult<ZhinaoClient> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_builder.build()?,
        };

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(
                HttpTransportImpl::new(&config.base_url, config.timeout)
                    .map_err(|e| ZhinaoError::configuration(e.to_string()))?,
            ),
        };

        let auth: Arc<dyn AuthProvider> = match self.auth {
            Some(a) => a,
            None => Arc::new(ApiKeyAuth::new(config.api_key().clone())),
        };
        auth.validate()?;

        let chat_service = Arc::new(
            ChatService::new(transport, auth, config.completions_path.clone())
                .with_headers(config.custom_headers.clone()),
        );

        let retry_config = self
            .retry_config
            .unwrap_or_else(|| RetryConfig::default().max_retries(config.max_retries));

        let tool_calling_manager: Arc<dyn ToolCallingManager> =
            match (self.tool_calling_manager, self.tool_callback_resolver) {
                (Some(manager), _) => manager,
                (None, Some(resolver)) => Arc::new(DefaultToolCallingManager::with_resolver(resolver)),
                (None, None) => Arc::new(DefaultToolCallingManager::new()),
            };

        let mut chat_model =
            ZhinaoChatModel::new(Arc::clone(&chat_service), config.default_options.clone())
                .with_retry_policy(RetryPolicy::new(retry_config))
                .with_tool_calling_manager(tool_calling_manager);
        if let Some(predicate) = self.tool_execution_eligibility_predicate {
            chat_model = chat_model.with_tool_execution_eligibility_predicate(predicate);
        }

        Ok(ZhinaoClient {
            config,
            chat_service,
            chat_model,
        })
    }
}
