//! Zhinao (360) chat client library.
//!
//! A Rust client for the Zhinao chat completions API. Provides blocking and
//! streaming chat, reassembly of tool calls that arrive split across stream
//! fragments, and an optional local tool-execution loop.
//!
//! # Features
//!
//! - **Chat Completions**: single-shot and server-sent-event streaming
//! - **Tool Calls**: streamed tool-call fragments merged into whole calls
//! - **Tool Execution**: local tools run in a loop until the model answers
//! - **Resilience**: retries with exponential backoff on transient errors
//! - **Observability**: `tracing` instrumentation and subscriber setup
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use zhinao_client::{Prompt, ZhinaoClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ZhinaoClient::from_env()?;
//!
//!     let response = client.chat_model().call(Prompt::user("Hello, Zhinao!")).await?;
//!     println!("{}", response.content().unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! # Streaming Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use zhinao_client::{Prompt, ZhinaoClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ZhinaoClient::from_env()?;
//!
//!     let mut stream = client.chat_model().stream(Prompt::user("Tell me a story"));
//!     while let Some(response) = stream.next().await {
//!         print!("{}", response?.content().unwrap_or_default());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod model;
pub mod observability;
pub mod resilience;
pub mod services;
pub mod streaming;
pub mod transport;
pub mod types;

/// Mock implementations for testing.
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

// Re-exports for convenience
pub use client::{ZhinaoClient, ZhinaoClientBuilder};
pub use config::ZhinaoConfig;
pub use errors::{ZhinaoError, ZhinaoResult};
pub use model::{
    ChatResponse, FunctionToolCallback, Prompt, PromptMessage, ToolCallback, ToolContext,
    ToolDefinition, ZhinaoChatModel, ZhinaoChatOptions,
};

// Type re-exports
pub use types::chat::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionMessage, ChatCompletionRequest,
    ChatModelId, FinishReason, Role, ToolCall, Usage, DEFAULT_CHAT_MODEL,
};
pub use types::tools::{FunctionDefinition, FunctionTool, ToolChoice};

/// Commonly used items.
pub mod prelude {
    pub use crate::model::{
        aggregate, ChatResponse, FunctionToolCallback, Prompt, PromptMessage, ToolCallback,
        ToolContext, ToolDefinition, ZhinaoChatModel, ZhinaoChatOptions,
    };
    pub use crate::{ZhinaoClient, ZhinaoConfig, ZhinaoError, ZhinaoResult};
}
