//! Tool Executor Gateway
//!
//! The conductor does not implement tools. It calls a [`ToolExecutor`] with
//! the parsed arguments and request context, and forwards whatever the
//! executor reports through its [`ProgressReporter`].
//!
//! ```rust,ignore
//! #[async_trait]
//! impl ToolExecutor for Transcriber {
//!     async fn execute(
//!         &self,
//!         invocation: ToolInvocation,
//!         progress: ProgressReporter,
//!         cancel: CancellationToken,
//!     ) -> Result<String, ToolExecutionError> {
//!         progress.report("downloading", json!({})).await;
//!         let audio = self.download(&invocation.arguments).await?;
//!         if cancel.is_cancelled() {
//!             return Err(invocation.cancelled());
//!         }
//!         progress.report("transcribing", json!({})).await;
//!         self.transcribe(audio).await
//!     }
//! }
//! ```

pub mod gateway;
pub mod registry;
pub mod validation;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use gateway::{ToolGateway, ToolOutcome};
pub use registry::{ToolHandler, ToolRegistry};
pub use validation::validate_arguments;

use crate::error::{ToolExecutionError, ToolFailureKind};
use crate::types::{ChatMessage, ProgressEvent};

/// Request-scoped data handed to every tool call.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub request_id: String,
    /// Opaque caller context (user, session, feature flags).
    pub data: Value,
    /// Conversation as sent to the provider for the turn that requested the call.
    pub messages: Arc<[ChatMessage]>,
}

/// One tool call to execute.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub context: ToolContext,
}

impl ToolInvocation {
    fn error(&self, kind: ToolFailureKind, message: impl Into<String>) -> ToolExecutionError {
        ToolExecutionError {
            tool_call_id: self.tool_call_id.clone(),
            tool_name: self.tool_name.clone(),
            kind,
            message: message.into(),
        }
    }

    /// The tool ran and failed.
    pub fn failure(&self, message: impl Into<String>) -> ToolExecutionError {
        self.error(ToolFailureKind::Failed, message)
    }

    /// The tool stopped at a checkpoint after cancellation.
    pub fn cancelled(&self) -> ToolExecutionError {
        self.error(ToolFailureKind::Cancelled, "cancelled")
    }

    pub fn unknown_tool(&self) -> ToolExecutionError {
        self.error(
            ToolFailureKind::UnknownTool,
            format!("no tool named `{}` is available", self.tool_name),
        )
    }

    pub fn timed_out(&self, after: std::time::Duration) -> ToolExecutionError {
        self.error(
            ToolFailureKind::TimedOut,
            format!("tool did not finish within {}s", after.as_secs_f64()),
        )
    }
}

/// Executes tool calls on behalf of the conductor.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run one tool call and return the content of its tool message.
    ///
    /// Implementations should check `cancel` between internal stages and
    /// return early once it fires. A cancelled call keeps being polled for
    /// [`CANCEL_GRACE`](crate::defaults::timeouts::CANCEL_GRACE) so it can
    /// clean up; after that it is dropped.
    async fn execute(
        &self,
        invocation: ToolInvocation,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<String, ToolExecutionError>;
}

/// Sends progress events of one tool call back to the gateway.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tool_call_id: String,
    tool_name: String,
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        tx: mpsc::Sender<ProgressEvent>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            tx,
        }
    }

    /// Report a stage. Delivery stops silently once the gateway is gone.
    pub async fn report(&self, event_type: impl Into<String>, data: Value) {
        let event = ProgressEvent::new(
            self.tool_call_id.clone(),
            self.tool_name.clone(),
            event_type,
            data,
        );
        if self.tx.send(event).await.is_err() {
            tracing::trace!(tool_call_id = %self.tool_call_id, "progress receiver dropped");
        }
    }

    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }
}
