//! Configuration for the Zhinao client.
//!
//! Holds the API key, endpoint location, timeout and retry settings, and the
//! chat options applied to every call unless overridden per prompt.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::auth::key_hint;
use crate::errors::{ZhinaoError, ZhinaoResult};
use crate::model::ZhinaoChatOptions;

/// Default base URL for the Zhinao API.
pub const DEFAULT_BASE_URL: &str = "https://api.360.cn";

/// Default path of the chat completions endpoint.
pub const DEFAULT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Per-request timeout unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Retries for a failed blocking completion unless configured otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Configuration for the Zhinao client.
#[derive(Clone)]
pub struct ZhinaoConfig {
    /// API key for authentication.
    pub(crate) api_key: SecretString,
    /// Base URL for API requests, without a trailing slash.
    pub base_url: String,
    /// Path of the chat completions endpoint.
    pub completions_path: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts of the blocking path.
    pub max_retries: u32,
    /// Extra headers sent with every request.
    pub custom_headers: Vec<(String, String)>,
    /// Chat options used when a prompt sets none.
    pub default_options: ZhinaoChatOptions,
}

impl ZhinaoConfig {
    /// Starts an empty builder.
    pub fn builder() -> ZhinaoConfigBuilder {
        ZhinaoConfigBuilder::new()
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `ZHINAO_API_KEY` (required): API key, overridden by `ZHINAO_CHAT_API_KEY`
    /// - `ZHINAO_BASE_URL`: base URL, overridden by `ZHINAO_CHAT_BASE_URL`
    /// - `ZHINAO_COMPLETIONS_PATH`: completions endpoint path
    /// - `ZHINAO_TIMEOUT`: request timeout in seconds
    /// - `ZHINAO_MAX_RETRIES`: maximum retry attempts
    /// - `ZHINAO_CHAT_MODEL`: default model
    /// - `ZHINAO_CHAT_TEMPERATURE`: default temperature
    ///
    /// # Errors
    ///
    /// Fails with [`ZhinaoError::Configuration`] when the API key is missing
    /// or a numeric variable does not parse.
    pub fn from_env() -> ZhinaoResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ZhinaoResult<Self> {
        let api_key = lookup("ZHINAO_CHAT_API_KEY")
            .or_else(|| lookup("ZHINAO_API_KEY"))
            .ok_or_else(|| ZhinaoError::configuration("ZHINAO_API_KEY environment variable not set"))?;

        let mut builder = ZhinaoConfigBuilder::new().api_key(api_key);

        if let Some(base_url) = lookup("ZHINAO_CHAT_BASE_URL").or_else(|| lookup("ZHINAO_BASE_URL")) {
            builder = builder.base_url(base_url);
        }

        if let Some(path) = lookup("ZHINAO_COMPLETIONS_PATH") {
            builder = builder.completions_path(path);
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "ZHINAO_TIMEOUT")? {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if let Some(retries) = parse_var::<u32>(&lookup, "ZHINAO_MAX_RETRIES")? {
            builder = builder.max_retries(retries);
        }

        let mut options = ZhinaoChatOptions::defaults();
        if let Some(model) = lookup("ZHINAO_CHAT_MODEL") {
            options = options.model(model);
        }
        if let Some(temperature) = parse_var::<f64>(&lookup, "ZHINAO_CHAT_TEMPERATURE")? {
            options = options.temperature(temperature);
        }

        builder.default_options(options).build()
    }

    /// The API key.
    pub(crate) fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    /// Masked API key, safe to log.
    pub fn api_key_hint(&self) -> String {
        key_hint(self.api_key.expose_secret())
    }

    /// Returns the full URL of the completions endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/{}", self.base_url, self.completions_path.trim_start_matches('/'))
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> ZhinaoResult<Option<T>> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ZhinaoError::configuration(format!("{name} is not a valid number: {raw:?}")))
}

impl std::fmt::Debug for ZhinaoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZhinaoConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("completions_path", &self.completions_path)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("default_options", &self.default_options)
            .finish()
    }
}

/// Builder for [`ZhinaoConfig`].
#[derive(Default)]
pub struct ZhinaoConfigBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    completions_path: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    custom_headers: Vec<(String, String)>,
    default_options: Option<ZhinaoChatOptions>,
}

impl ZhinaoConfigBuilder {
    /// Starts an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// API key sent as a bearer token.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Scheme and host of the API, e.g. `https://api.360.cn`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the completions endpoint path.
    pub fn completions_path(mut self, path: impl Into<String>) -> Self {
        self.completions_path = Some(path.into());
        self
    }

    /// Per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retries for blocking completions.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Adds a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }

    /// Sets the default chat options.
    pub fn default_options(mut self, options: ZhinaoChatOptions) -> Self {
        self.default_options = Some(options);
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Fails with [`ZhinaoError::Configuration`] on a missing or empty API
    /// key, an empty completions path, or a base URL that is not an
    /// `http`/`https` URL.
    pub fn build(self) -> ZhinaoResult<ZhinaoConfig> {
        let api_key = self
            .api_key
            .ok_or_else(|| ZhinaoError::configuration("API key is required"))?;
        if api_key.trim().is_empty() {
            return Err(ZhinaoError::configuration("API key cannot be empty"));
        }

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| ZhinaoError::configuration(format!("Invalid base URL '{base_url}': {e}")))?;
        match parsed.scheme() {
            "https" => {}
            "http" => warn!(base_url = %base_url, "Base URL does not use HTTPS"),
            scheme => {
                return Err(ZhinaoError::configuration(format!(
                    "Base URL must use http or https, got '{scheme}'"
                )))
            }
        }

        let completions_path = self
            .completions_path
            .unwrap_or_else(|| DEFAULT_COMPLETIONS_PATH.to_string());
        if completions_path.trim().is_empty() {
            return Err(ZhinaoError::configuration("Completions path cannot be empty"));
        }

        Ok(ZhinaoConfig {
            api_key: SecretString::new(api_key),
            base_url,
            completions_path,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            custom_headers: self.custom_headers,
            default_options: self.default_options.unwrap_or_else(ZhinaoChatOptions::defaults),
        })
    }
}
