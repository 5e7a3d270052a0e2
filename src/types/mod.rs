//! Type definitions for the Zhinao API.
//!
//! Wire-level request, response, and streaming fragment types for chat
//! completions, plus tool descriptors.

pub mod chat;
pub mod tools;
