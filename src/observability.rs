//! Tracing subscriber initialisation
//!
//! ## Example
//!
//! ```rust,no_run
//! use tool_conductor::observability::{OutputFormat, SubscriberConfig, init_subscriber};
//!
//! # fn main() -> Result<(), tool_conductor::ConductorError> {
//! let config = SubscriberConfig::builder()
//!     .log_level(tracing::Level::DEBUG)
//!     .output_format(OutputFormat::Json)
//!     .build();
//! // Keep the guard alive for as long as file logging is needed.
//! let _guard = init_subscriber(config)?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::error::ConductorError;

pub const ENV_LOG_LEVEL: &str = "CONDUCTOR_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "CONDUCTOR_LOG_FORMAT";
pub const ENV_LOG_FILE: &str = "CONDUCTOR_LOG_FILE";

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Single-line text without span context
    Compact,
}

impl std::str::FromStr for OutputFormat {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(ConductorError::Configuration(format!(
                "invalid log format `{other}`; valid options: text, json, compact"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub log_level: tracing::Level,
    pub output_format: OutputFormat,
    /// Log to this file instead of stdout.
    pub log_file: Option<PathBuf>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            output_format: OutputFormat::Text,
            log_file: None,
        }
    }
}

impl SubscriberConfig {
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder::default()
    }

    /// Read `CONDUCTOR_LOG_LEVEL`, `CONDUCTOR_LOG_FORMAT` and `CONDUCTOR_LOG_FILE`.
    pub fn from_env() -> Result<Self, ConductorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConductorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            builder = builder.log_level_str(&level)?;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            builder = builder.output_format(format.parse()?);
        }
        if let Some(path) = lookup(ENV_LOG_FILE).filter(|p| !p.is_empty()) {
            builder = builder.log_file(PathBuf::from(path));
        }
        Ok(builder.build())
    }
}

/// Builder for SubscriberConfig
#[derive(Debug, Default)]
pub struct SubscriberConfigBuilder {
    log_level: Option<tracing::Level>,
    output_format: Option<OutputFormat>,
    log_file: Option<PathBuf>,
}

impl SubscriberConfigBuilder {
    pub fn log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Set the log level from a string
    pub fn log_level_str(mut self, level: &str) -> Result<Self, ConductorError> {
        let level = level.parse::<tracing::Level>().map_err(|_| {
            ConductorError::Configuration(format!(
                "invalid log level `{level}`; valid options: trace, debug, info, warn, error"
            ))
        })?;
        self.log_level = Some(level);
        Ok(self)
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    pub fn build(self) -> SubscriberConfig {
        SubscriberConfig {
            log_level: self.log_level.unwrap_or(tracing::Level::INFO),
            output_format: self.output_format.unwrap_or_default(),
            log_file: self.log_file,
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns the
/// appender's `WorkerGuard` when logging to a file; it must be kept alive for
/// buffered lines to be flushed. Calling this when a subscriber is already
/// installed is not an error.
pub fn init_subscriber(config: SubscriberConfig) -> Result<Option<WorkerGuard>, ConductorError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tool_conductor={}",
            config.log_level.as_str().to_lowercase()
        ))
    });

    match &config.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path.file_name().ok_or_else(|| {
                ConductorError::Configuration(format!("log file `{}` has no file name", path.display()))
            })?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            install(filter, config.output_format, writer)?;
            Ok(Some(guard))
        }
        None => {
            install(filter, config.output_format, std::io::stdout)?;
            Ok(None)
        }
    }
}

fn install<W>(filter: EnvFilter, format: OutputFormat, writer: W) -> Result<(), ConductorError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);
    let result = match format {
        OutputFormat::Text => builder.try_init(),
        OutputFormat::Json => builder.json().with_current_span(true).try_init(),
        OutputFormat::Compact => builder.compact().try_init(),
    };

    match result {
        Ok(()) => Ok(()),
        // A global subscriber or `log` bridge is already installed.
        Err(e) if e.to_string().contains("already") => Ok(()),
        Err(e) => Err(ConductorError::Configuration(format!(
            "failed to initialize tracing: {e}"
        ))),
    }
}
