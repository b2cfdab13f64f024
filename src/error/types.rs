//! Core error types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProviderType;

use super::helpers::{extract_provider_message, summarize_failures, truncate};

/// Coarse classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFailureKind {
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError,
    /// HTTP 401 / 403
    Authentication,
    /// Connect, send or stream-idle timeout
    Timeout,
    /// Connection refused, reset or aborted mid-stream
    Network,
    /// Stream closed before the provider signalled the end of the turn
    StreamTruncated,
    /// Other 4xx responses
    BadRequest,
    Other,
}

impl ProviderFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Authentication => "authentication",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::StreamTruncated => "stream_truncated",
            Self::BadRequest => "bad_request",
            Self::Other => "other",
        }
    }

    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            401 | 403 => Self::Authentication,
            408 => Self::Timeout,
            500..=599 => Self::ServerError,
            400..=499 => Self::BadRequest,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ProviderFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure of one provider request (connection, HTTP status or stream).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("provider `{provider_id}` failed ({kind}): {message}")]
pub struct ProviderError {
    pub provider_id: String,
    pub status: Option<u16>,
    pub kind: ProviderFailureKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider_id: impl Into<String>,
        kind: ProviderFailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            status: None,
            kind,
            message: message.into(),
        }
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(provider_id: impl Into<String>, status: u16, body: &str) -> Self {
        Self {
            provider_id: provider_id.into(),
            status: Some(status),
            kind: ProviderFailureKind::from_status(status),
            message: extract_provider_message(status, body),
        }
    }

    pub fn network(provider_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider_id, ProviderFailureKind::Network, message)
    }

    pub fn timeout(provider_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider_id, ProviderFailureKind::Timeout, message)
    }

    pub fn truncated(provider_id: impl Into<String>) -> Self {
        Self::new(
            provider_id,
            ProviderFailureKind::StreamTruncated,
            "stream closed before the provider finished the turn",
        )
    }

    /// Rate-limit or transient server failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ProviderFailureKind::RateLimited
                | ProviderFailureKind::ServerError
                | ProviderFailureKind::Timeout
                | ProviderFailureKind::Network
        )
    }
}

/// Record of one provider attempt that failed, kept for the aggregated error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub provider_type: ProviderType,
    pub model: String,
    pub kind: ProviderFailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub reason: String,
}

/// One malformed event in a provider stream. Decoding continues after it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed stream event: {message}")]
pub struct StreamParseError {
    pub message: String,
    /// The offending payload, truncated for logging.
    pub payload: String,
}

impl StreamParseError {
    pub fn new(message: impl Into<String>, payload: &str) -> Self {
        Self {
            message: message.into(),
            payload: truncate(payload, 200),
        }
    }
}

/// A tool call whose accumulated arguments are not valid (JSON or schema).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid arguments for tool `{tool_name}` ({tool_call_id}): {reason}")]
pub struct ToolArgumentsError {
    pub tool_call_id: String,
    pub tool_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailureKind {
    /// The tool ran and reported a failure
    Failed,
    TimedOut,
    Cancelled,
    UnknownTool,
    InvalidArguments,
}

impl ToolFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::UnknownTool => "unknown_tool",
            Self::InvalidArguments => "invalid_arguments",
        }
    }
}

/// A tool that ran and failed, timed out or was cancelled.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("tool `{tool_name}` ({tool_call_id}) {}: {message}", .kind.as_str())]
pub struct ToolExecutionError {
    pub tool_call_id: String,
    pub tool_name: String,
    pub kind: ToolFailureKind,
    pub message: String,
}

impl From<ToolArgumentsError> for ToolExecutionError {
    fn from(err: ToolArgumentsError) -> Self {
        Self {
            tool_call_id: err.tool_call_id,
            tool_name: err.tool_name,
            kind: ToolFailureKind::InvalidArguments,
            message: err.reason,
        }
    }
}

/// Error category for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Stream,
    Tool,
    Provider,
    Exhausted,
    SafetyLimit,
    Cancelled,
    Timeout,
    Request,
    Internal,
}

/// Conductor error taxonomy.
#[derive(Debug, Clone, Error)]
pub enum ConductorError {
    #[error(transparent)]
    StreamParse(#[from] StreamParseError),

    #[error(transparent)]
    ToolArguments(#[from] ToolArgumentsError),

    #[error(transparent)]
    ToolExecution(#[from] ToolExecutionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Every provider in the pool failed or was unusable.
    #[error("no provider available; attempted: {}", summarize_failures(.attempts))]
    NoProviderAvailable { attempts: Vec<ProviderFailure> },

    #[error("safety iteration limit reached after {iterations} iterations")]
    SafetyLimitReached { iterations: u32 },

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unrecoverable transport failure (e.g. HTTP client construction).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ConductorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::StreamParse(_) => ErrorCategory::Stream,
            Self::ToolArguments(_) | Self::ToolExecution(_) => ErrorCategory::Tool,
            Self::Provider(_) => ErrorCategory::Provider,
            Self::NoProviderAvailable { .. } => ErrorCategory::Exhausted,
            Self::SafetyLimitReached { .. } => ErrorCategory::SafetyLimit,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::InvalidRequest(_) | Self::Configuration(_) => ErrorCategory::Request,
            Self::Transport(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether this error ends the request. Everything else is absorbed into
    /// the conversation or retried on another provider.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::StreamParse(_)
                | Self::ToolArguments(_)
                | Self::ToolExecution(_)
                | Self::Provider(_)
                | Self::SafetyLimitReached { .. }
        )
    }

    /// Stable identifier used in client `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StreamParse(_) => "stream_parse",
            Self::ToolArguments(_) => "tool_arguments",
            Self::ToolExecution(_) => "tool_execution",
            Self::Provider(_) => "provider",
            Self::NoProviderAvailable { .. } => "no_provider_available",
            Self::SafetyLimitReached { .. } => "safety_limit_reached",
            Self::Cancelled => "cancelled",
            Self::Timeout(_) => "timeout",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration",
            Self::Transport(_) => "transport",
            Self::Internal(_) => "internal",
        }
    }

    /// Per-provider attempts carried by an aggregated failover error.
    pub fn attempts(&self) -> &[ProviderFailure] {
        match self {
            Self::NoProviderAvailable { attempts } => attempts,
            _ => &[],
        }
    }
}
