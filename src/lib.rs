//! tool-conductor
//!
//! Streaming tool-calling orchestration for multi-provider LLM chat proxies.
//!
//! A [`Conductor`] takes a conversation, a tool catalogue and a pool of
//! OpenAI-compatible providers, then loops: stream one assistant turn from the
//! preferred provider (failing over on errors), decide whether the turn ends
//! the conversation, execute its tool calls concurrently, append the results
//! and go again. Everything the client needs to render the run is emitted as
//! [`ConductorEvent`](types::ConductorEvent)s.
#![deny(unsafe_code)]

pub mod conductor;
pub mod config;
pub mod defaults;
pub mod error;
pub mod observability;
pub mod providers;
pub mod selector;
pub mod server_adapters;
pub mod streaming;
pub mod tools;
pub mod types;
pub mod utils;

pub use conductor::{Conductor, ConductorOutcome, ConductorRequest};
pub use error::ConductorError;

/// Commonly used types
pub mod prelude {
    pub use crate::conductor::{
        Conductor, ConductorOutcome, ConductorRequest, ConductorState, TerminationCause,
    };
    pub use crate::config::{
        ComplexityHint, ConductorOptions, ProviderConfig, ProviderType, pool_from_json,
    };
    pub use crate::error::{ConductorError, ProviderError, ProviderFailureKind, ToolExecutionError};
    pub use crate::providers::{ChatTransport, HttpTransport};
    pub use crate::tools::{
        ProgressReporter, ToolContext, ToolExecutor, ToolHandler, ToolInvocation, ToolRegistry,
    };
    pub use crate::types::{
        ChatMessage, ConductorEvent, EventStream, FinishReason, MessageRole, ProgressEvent,
        TerminalState, Tool, ToolCall, Usage,
    };
    pub use crate::utils::CancelHandle;
}

static_assertions::assert_impl_all!(Conductor: Send, Sync, Clone);
static_assertions::assert_impl_all!(tools::ToolRegistry: Send, Sync);
static_assertions::assert_impl_all!(types::ConductorEvent: Send, Sync);
