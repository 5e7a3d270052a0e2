//! Observability for the Zhinao client.
//!
//! The client reports through `tracing` spans and events: every request is
//! instrumented with its model, retries log at `info`, and soft failures at
//! `warn`. [`LoggingConfig`] installs a `tracing-subscriber` pipeline for
//! applications that do not bring their own.

mod logging;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
