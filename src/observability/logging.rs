//! Logging configuration.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{ZhinaoError, ZhinaoResult};

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
    /// Single-line output.
    Compact,
}

/// Logging configuration for applications embedding the client.
///
/// The client itself only emits `tracing` events; this installs a
/// subscriber that prints them.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level, used when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Whether to print the event target.
    pub include_target: bool,
    /// Whether to print file and line.
    pub include_file_line: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            include_target: true,
            include_file_line: false,
        }
    }
}

impl LoggingConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets whether to print the event target.
    #[must_use]
    pub fn with_target(mut self, include: bool) -> Self {
        self.include_target = include;
        self
    }

    /// Sets whether to print file and line.
    #[must_use]
    pub fn with_file_line(mut self, include: bool) -> Self {
        self.include_file_line = include;
        self
    }

    /// Builds the event filter. `RUST_LOG` takes precedence over `level`.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from(self.level).into())
            .from_env_lossy()
    }

    /// Installs the global subscriber.
    ///
    /// # Errors
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(self) -> ZhinaoResult<()> {
        let filter = self.env_filter();
        let registry = tracing_subscriber::registry().with(filter);

        let result = match self.format {
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(self.include_target)
                        .with_file(self.include_file_line)
                        .with_line_number(self.include_file_line),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_target(self.include_target))
                .try_init(),
            LogFormat::Compact => registry
                .with(fmt::layer().compact().with_target(self.include_target))
                .try_init(),
        };

        result.map_err(|e| ZhinaoError::configuration(format!("Failed to initialize logging: {e}")))
    }
}
