//! Gateway between the conductor and the tool executor.
//!
//! For every call the client sees `tool_call_start`, then the executor's
//! progress events in the order they were reported, then exactly one terminal
//! progress event and `tool_call_result`. Failures of any kind become
//! tool-role messages.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{Value, json};
use tokio::sync::{Semaphore, mpsc};
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;

use super::{ProgressReporter, ToolContext, ToolExecutor, ToolInvocation};
use crate::conductor::EventSink;
use crate::defaults;
use crate::error::{ToolExecutionError, ToolFailureKind};
use crate::streaming::ResolvedToolCall;
use crate::types::{ChatMessage, ConductorEvent, ProgressEvent, ToolCall, progress};

/// Result of one tool call, ready to append to the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub call: ToolCall,
    pub message: ChatMessage,
    pub is_error: bool,
}

#[derive(Clone)]
pub struct ToolGateway {
    executor: Arc<dyn ToolExecutor>,
    timeout: Duration,
    max_concurrent: usize,
}

impl std::fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGateway")
            .field("timeout", &self.timeout)
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl ToolGateway {
    pub fn new(executor: Arc<dyn ToolExecutor>, timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            executor,
            timeout,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Execute sibling calls concurrently and join on all of them.
    ///
    /// Outcomes are returned in call order regardless of completion order.
    pub async fn execute_all(
        &self,
        calls: &[ResolvedToolCall],
        context: &ToolContext,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> Vec<ToolOutcome> {
        let permits = Semaphore::new(self.max_concurrent);
        let runs = calls.iter().map(|call| {
            let permits = &permits;
            async move {
                let _permit = permits.acquire().await.ok();
                self.execute(call, context, sink, cancel).await
            }
        });
        join_all(runs).await
    }

    /// Execute one call, emitting its client events.
    pub async fn execute(
        &self,
        resolved: &ResolvedToolCall,
        context: &ToolContext,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        let id = resolved.id().to_string();
        let name = resolved.name().to_string();
        let shown_arguments = match &resolved.arguments {
            Ok(args) => args.clone(),
            Err(_) => Value::String(resolved.call.function.arguments.clone()),
        };

        sink.emit(ConductorEvent::ToolCallStart {
            tool_call_id: id.clone(),
            tool_name: name.clone(),
            arguments: shown_arguments,
        })
        .await;

        let (result, saw_terminal) = match &resolved.arguments {
            Err(e) => (Err(ToolExecutionError::from(e.clone())), false),
            Ok(arguments) => {
                let invocation = ToolInvocation {
                    tool_call_id: id.clone(),
                    tool_name: name.clone(),
                    arguments: arguments.clone(),
                    context: context.clone(),
                };
                self.run_executor(invocation, sink, cancel).await
            }
        };

        if !saw_terminal {
            let (event_type, data) = match &result {
                Ok(_) => (progress::COMPLETE, json!({})),
                Err(e) => (terminal_event_type(e.kind), json!({ "message": e.message })),
            };
            sink.emit(ConductorEvent::ToolCallProgress(ProgressEvent::new(
                id.clone(),
                name.clone(),
                event_type,
                data,
            )))
            .await;
        }

        let (content, is_error) = match result {
            Ok(content) => (content, false),
            Err(e) => {
                tracing::warn!(
                    tool_call_id = %id,
                    tool = %name,
                    kind = e.kind.as_str(),
                    error = %e.message,
                    "tool call failed"
                );
                (failure_content(&e), true)
            }
        };

        sink.emit(ConductorEvent::ToolCallResult {
            tool_call_id: id.clone(),
            tool_name: name.clone(),
            content: content.clone(),
            is_error,
        })
        .await;

        ToolOutcome {
            call: resolved.call.clone(),
            message: ChatMessage::tool(id, name, content),
            is_error,
        }
    }

    /// Run the executor under the tool timeout while forwarding its progress.
    ///
    /// Returns the result and whether the executor already reported a
    /// terminal progress event.
    async fn run_executor(
        &self,
        invocation: ToolInvocation,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> (Result<String, ToolExecutionError>, bool) {
        let (tx, mut rx) = mpsc::channel(defaults::limits::PROGRESS_CHANNEL_CAPACITY);
        let reporter = ProgressReporter::new(
            invocation.tool_call_id.clone(),
            invocation.tool_name.clone(),
            tx,
        );
        let token = cancel.child_token();
        let fallback = invocation.clone();

        tracing::debug!(
            tool_call_id = %invocation.tool_call_id,
            tool = %invocation.tool_name,
            "executing tool"
        );

        let run = tokio::time::timeout(
            self.timeout,
            self.executor.execute(invocation, reporter, token.clone()),
        );
        tokio::pin!(run);

        let mut saw_terminal = false;
        let result = loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => {
                    saw_terminal |= event.is_terminal();
                    sink.emit(ConductorEvent::ToolCallProgress(event)).await;
                }
                _ = cancel.cancelled() => {
                    token.cancel();
                    break self
                        .wind_down(run.as_mut(), &mut rx, sink, &mut saw_terminal, &fallback)
                        .await;
                }
                finished = &mut run => {
                    break match finished {
                        Ok(result) => result,
                        Err(_) => {
                            token.cancel();
                            Err(fallback.timed_out(self.timeout))
                        }
                    };
                }
            }
        };

        // Progress reported just before the executor returned.
        while let Ok(event) = rx.try_recv() {
            saw_terminal |= event.is_terminal();
            sink.emit(ConductorEvent::ToolCallProgress(event)).await;
        }

        (result, saw_terminal)
    }

    /// Keep polling a cancelled executor so it can reach its own cancellation
    /// checkpoint. The call is dropped once the grace period runs out.
    async fn wind_down<F>(
        &self,
        mut run: Pin<&mut F>,
        rx: &mut mpsc::Receiver<ProgressEvent>,
        sink: &EventSink,
        saw_terminal: &mut bool,
        invocation: &ToolInvocation,
    ) -> Result<String, ToolExecutionError>
    where
        F: Future<Output = Result<Result<String, ToolExecutionError>, Elapsed>>,
    {
        let grace = tokio::time::sleep(defaults::timeouts::CANCEL_GRACE);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => {
                    *saw_terminal |= event.is_terminal();
                    sink.emit(ConductorEvent::ToolCallProgress(event)).await;
                }
                finished = &mut run => {
                    return match finished {
                        Ok(Err(e)) => Err(e),
                        Ok(Ok(_)) | Err(_) => Err(invocation.cancelled()),
                    };
                }
                _ = &mut grace => {
                    tracing::warn!(
                        tool_call_id = %invocation.tool_call_id,
                        tool = %invocation.tool_name,
                        grace_secs = defaults::timeouts::CANCEL_GRACE.as_secs(),
                        "tool ignored cancellation; dropping it"
                    );
                    return Err(invocation.cancelled());
                }
            }
        }
    }
}

fn terminal_event_type(kind: ToolFailureKind) -> &'static str {
    match kind {
        ToolFailureKind::TimedOut => progress::TIMEOUT,
        ToolFailureKind::Cancelled => progress::CANCELLED,
        _ => progress::ERROR,
    }
}

/// Tool message content describing a failure to the model.
fn failure_content(error: &ToolExecutionError) -> String {
    json!({
        "error": error.kind.as_str(),
        "message": error.message,
    })
    .to_string()
}
