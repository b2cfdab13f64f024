//! Conductor state machine and per-request iteration state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConductorError;
use crate::types::{ChatMessage, FinishReason, TerminalState};

/// Why a request ended in `TerminatedError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    NoProviderAvailable,
    Cancelled,
    TimedOut,
    /// Any other fatal error (invalid request, transport, internal).
    Fatal,
}

impl TerminationCause {
    pub fn from_error(error: &ConductorError) -> Self {
        match error {
            ConductorError::NoProviderAvailable { .. } => Self::NoProviderAvailable,
            ConductorError::Cancelled => Self::Cancelled,
            ConductorError::Timeout(_) => Self::TimedOut,
            _ => Self::Fatal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConductorState {
    SelectingProvider,
    StreamingResponse,
    Evaluating,
    ExecutingTools,
    TerminatedSuccess,
    TerminatedSafetyLimit,
    TerminatedError(TerminationCause),
}

impl ConductorState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TerminatedSuccess | Self::TerminatedSafetyLimit | Self::TerminatedError(_)
        )
    }

    /// Client-facing terminal state, for terminal states only.
    pub fn terminal_state(&self) -> Option<TerminalState> {
        match self {
            Self::TerminatedSuccess => Some(TerminalState::Success),
            Self::TerminatedSafetyLimit => Some(TerminalState::SafetyLimit),
            Self::TerminatedError(_) => Some(TerminalState::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelectingProvider => "selecting_provider",
            Self::StreamingResponse => "streaming_response",
            Self::Evaluating => "evaluating",
            Self::ExecutingTools => "executing_tools",
            Self::TerminatedSuccess => "terminated_success",
            Self::TerminatedSafetyLimit => "terminated_safety_limit",
            Self::TerminatedError(_) => "terminated_error",
        }
    }
}

impl fmt::Display for ConductorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TerminatedError(cause) => write!(f, "terminated_error({cause:?})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Mutable state of one conductor invocation. Never shared between requests.
#[derive(Debug, Clone)]
pub struct IterationState {
    pub state: ConductorState,
    /// Completed or in-progress assistant turns.
    pub iteration_count: u32,
    /// Ceiling on provider requests, failed attempts included.
    pub hard_max_iterations: u32,
    /// Provider requests issued so far.
    pub provider_requests: u32,
    pub current_messages: Vec<ChatMessage>,
    pub finish_reason: Option<FinishReason>,
    pub last_assistant_content_length: usize,
}

impl IterationState {
    pub fn new(messages: Vec<ChatMessage>, hard_max_iterations: u32) -> Self {
        Self {
            state: ConductorState::SelectingProvider,
            iteration_count: 0,
            hard_max_iterations,
            provider_requests: 0,
            current_messages: messages,
            finish_reason: None,
            last_assistant_content_length: 0,
        }
    }

    pub fn transition(&mut self, next: ConductorState) {
        if self.state.is_terminal() {
            tracing::error!(from = %self.state, to = %next, "transition out of a terminal state ignored");
            return;
        }
        tracing::debug!(
            from = %self.state,
            to = %next,
            iteration = self.iteration_count,
            "conductor state transition"
        );
        self.state = next;
    }

    /// Whether another provider request would exceed the ceiling.
    pub fn ceiling_reached(&self) -> bool {
        self.provider_requests >= self.hard_max_iterations
    }
}
