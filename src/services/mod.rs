//! Service implementations for the Zhinao API.

mod chat;

pub use chat::{ChatCompletionStream, ChatService};
