//! Client-facing event types
//!
//! `ConductorEvent` is what the proxy streams to its client (conceptually SSE),
//! and `ProgressEvent` is what tool executors report while they run.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::chat::ChatMessage;
use super::common::{FinishReason, Usage};
use crate::error::ProviderFailure;

/// Well-known progress event types. Executors may use any other string.
pub mod progress {
    pub const STARTED: &str = "started";
    pub const COMPLETE: &str = "complete";
    pub const ERROR: &str = "error";
    pub const TIMEOUT: &str = "timeout";
    pub const CANCELLED: &str = "cancelled";
}

/// Progress report of one tool execution, forwarded verbatim to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Tool-specific stage, e.g. `downloading`, `chunking`, `transcribing`.
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl ProgressEvent {
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        event_type: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            event_type: event_type.into(),
            data,
        }
    }

    /// Whether this event resolves the tool call (success or failure).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event_type.as_str(),
            progress::COMPLETE | progress::ERROR | progress::TIMEOUT | progress::CANCELLED
        )
    }
}

/// How a conductor run ended, as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Success,
    SafetyLimit,
    Error,
}

/// Event streamed to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConductorEvent {
    /// Lifecycle notice (provider selected, failover, executing tools).
    Status {
        message: String,
        iteration: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Assistant content fragment.
    Delta { content: String, iteration: u32 },
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolCallProgress(ProgressEvent),
    ToolCallResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
    /// The final assistant message of the conversation.
    MessageComplete {
        message: ChatMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
    },
    Complete {
        state: TerminalState,
        iterations: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    Error {
        kind: String,
        message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attempts: Vec<ProviderFailure>,
    },
}

impl ConductorEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Delta { .. } => "delta",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallProgress(_) => "tool_call_progress",
            Self::ToolCallResult { .. } => "tool_call_result",
            Self::MessageComplete { .. } => "message_complete",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// Tool call this event belongs to, if any.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::ToolCallStart { tool_call_id, .. }
            | Self::ToolCallResult { tool_call_id, .. } => Some(tool_call_id),
            Self::ToolCallProgress(p) => Some(&p.tool_call_id),
            _ => None,
        }
    }
}

/// Client event stream produced by `Conductor::stream`.
pub type EventStream = Pin<Box<dyn Stream<Item = ConductorEvent> + Send>>;
