//! Orchestration Loop
//!
//! A [`Conductor`] drives one conversation per request through
//! `SELECTING_PROVIDER → STREAMING_RESPONSE → EVALUATING → EXECUTING_TOOLS`
//! until the stop condition ends it, every provider has failed, or the
//! request is cancelled.
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use tool_conductor::prelude::*;
//!
//! # async fn demo() -> Result<(), ConductorError> {
//! let conductor = Conductor::http(Arc::new(ToolRegistry::new()), ConductorOptions::default())?;
//! let providers = pool_from_json(r#"[{"id":"groq","type":"free-tier-groq","apiKey":"gsk_..."}]"#)?;
//! let request = ConductorRequest::new(vec![ChatMessage::user("2+2?")], providers);
//!
//! let mut events = conductor.stream(request);
//! while let Some(event) = events.next().await {
//!     println!("{}", serde_json::to_string(&event).unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

mod run;
pub mod sink;
pub mod state;
pub mod stop;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use sink::EventSink;
pub use state::{ConductorState, IterationState, TerminationCause};
pub use stop::{StopDecision, StopInput, StopPolicy, StopReason};

use crate::config::{ComplexityHint, ConductorOptions, ProviderConfig};
use crate::error::ConductorError;
use crate::providers::{ChatTransport, HttpTransport};
use crate::tools::{ToolExecutor, ToolGateway};
use crate::types::{ChatMessage, ConductorEvent, EventStream, Tool, Usage};
use crate::utils::CancelHandle;

/// One inbound conversation request.
#[derive(Debug, Clone, Default)]
pub struct ConductorRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Tool>,
    /// Resolved provider pool for this request.
    pub providers: Vec<ProviderConfig>,
    /// Derived from the request shape when absent.
    pub complexity: Option<ComplexityHint>,
    /// Opaque caller context passed to tool executions.
    pub context: Value,
    /// Cancelling this token aborts the request.
    pub cancel: CancellationToken,
}

impl ConductorRequest {
    pub fn new(messages: Vec<ChatMessage>, providers: Vec<ProviderConfig>) -> Self {
        Self {
            messages,
            providers,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_complexity(mut self, hint: ComplexityHint) -> Self {
        self.complexity = Some(hint);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// How a request ended.
#[derive(Debug, Clone)]
pub struct ConductorOutcome {
    /// Always a terminal state.
    pub state: ConductorState,
    pub iterations: u32,
    /// Final conversation, including the closing assistant message.
    pub messages: Vec<ChatMessage>,
    pub final_message: Option<ChatMessage>,
    pub usage: Option<Usage>,
    pub error: Option<ConductorError>,
}

impl ConductorOutcome {
    pub fn is_success(&self) -> bool {
        self.state == ConductorState::TerminatedSuccess
    }
}

/// Tool-calling orchestration engine.
///
/// Cheap to clone; holds no per-request state.
#[derive(Clone)]
pub struct Conductor {
    transport: Arc<dyn ChatTransport>,
    gateway: ToolGateway,
    options: ConductorOptions,
}

impl std::fmt::Debug for Conductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conductor")
            .field("gateway", &self.gateway)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Conductor {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        executor: Arc<dyn ToolExecutor>,
        options: ConductorOptions,
    ) -> Self {
        let gateway = ToolGateway::new(executor, options.tool_timeout, options.max_concurrent_tools);
        Self {
            transport,
            gateway,
            options,
        }
    }

    /// Conductor talking to providers over HTTP.
    pub fn http(
        executor: Arc<dyn ToolExecutor>,
        options: ConductorOptions,
    ) -> Result<Self, ConductorError> {
        options.validate()?;
        let transport = HttpTransport::new()?;
        Ok(Self::new(Arc::new(transport), executor, options))
    }

    pub fn options(&self) -> &ConductorOptions {
        &self.options
    }

    fn stop_policy(&self) -> StopPolicy {
        StopPolicy {
            safety_iteration_cap: self.options.safety_iteration_cap,
            substantive_answer_chars: self.options.substantive_answer_chars,
        }
    }

    /// Run the request on a background task and return its event stream.
    ///
    /// Dropping the stream cancels the request.
    pub fn stream(&self, request: ConductorRequest) -> EventStream {
        let (tx, mut rx) = mpsc::channel(self.options.event_channel_capacity);
        let conductor = self.clone();
        tokio::spawn(async move {
            conductor.run(request, tx).await;
        });
        Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        })
    }

    /// Like [`Conductor::stream`], also returning a handle that aborts the request.
    pub fn stream_cancellable(&self, request: ConductorRequest) -> (EventStream, CancelHandle) {
        let handle = CancelHandle::child_of(&request.cancel);
        let request = request.with_cancel(handle.token());
        (self.stream(request), handle)
    }

    /// Run the request to completion, sending client events into `events`.
    pub async fn run(
        &self,
        request: ConductorRequest,
        events: mpsc::Sender<ConductorEvent>,
    ) -> ConductorOutcome {
        run::execute(self, request, events).await
    }
}
