//! Resilience layer for the Zhinao client.
//!
//! Only the blocking completion path is retried. A stream is never
//! restarted once chunks have been delivered.

mod retry;

pub use retry::{RetryConfig, RetryPolicy};
