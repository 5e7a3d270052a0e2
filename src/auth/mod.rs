//! Authentication for the Zhinao client.
//!
//! The API key is sent as a bearer token. It is held in a
//! [`SecretString`] and never appears in `Debug` output or logs.

use http::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

use crate::errors::{ZhinaoError, ZhinaoResult};

/// Adds credentials to outgoing requests.
pub trait AuthProvider: Send + Sync {
    /// Writes the credential headers into `headers`.
    fn apply_auth(&self, headers: &mut HashMap<String, String>);

    /// Scheme used in the `Authorization` header.
    fn scheme(&self) -> &str;

    /// Checks the credentials before the first request.
    ///
    /// # Errors
    ///
    /// Fails when the credentials can never be accepted.
    fn validate(&self) -> ZhinaoResult<()>;
}

/// Bearer-token authentication with a Zhinao API key.
pub struct ApiKeyAuth {
    api_key: SecretString,
}

impl ApiKeyAuth {
    /// Wraps an API key.
    pub fn new(api_key: SecretString) -> Self {
        Self { api_key }
    }

    /// Wraps a plain-text API key.
    pub fn from_string(api_key: impl Into<String>) -> Self {
        Self::new(SecretString::new(api_key.into()))
    }

    /// Masked form of the key, safe to log.
    pub fn key_hint(&self) -> String {
        key_hint(self.api_key.expose_secret())
    }
}

/// Keeps the last four characters of a key longer than four characters.
pub(crate) fn key_hint(key: &str) -> String {
    match key.char_indices().rev().nth(3) {
        Some((start, _)) if start > 0 => format!("...{}", &key[start..]),
        _ => "****".to_string(),
    }
}

impl AuthProvider for ApiKeyAuth {
    fn apply_auth(&self, headers: &mut HashMap<String, String>) {
        headers.insert(
            AUTHORIZATION.as_str().to_string(),
            format!("Bearer {}", self.api_key.expose_secret()),
        );
    }

    fn scheme(&self) -> &str {
        "Bearer"
    }

    fn validate(&self) -> ZhinaoResult<()> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ZhinaoError::Authentication {
                message: "API key cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("api_key", &"[REDACTED]")
            .field("key_hint", &self.key_hint())
            .finish()
    }
}
