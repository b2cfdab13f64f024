//! The per-request loop.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{
    Conductor, ConductorOutcome, ConductorRequest, ConductorState, EventSink, IterationState,
    StopDecision, StopInput, StopReason, TerminationCause,
};
use crate::defaults;
use crate::error::{ConductorError, ProviderError};
use crate::providers::{ChatRequest, ProviderTarget};
use crate::selector::{ProviderSelector, derive_complexity};
use crate::streaming::{ResolvedToolCall, ToolCallAccumulator};
use crate::tools::ToolContext;
use crate::tools::validation::validate_calls;
use crate::types::{ChatMessage, ConductorEvent, FinishReason, Usage, validate_conversation};

/// Output of one successfully streamed assistant turn.
#[derive(Debug, Default)]
struct Turn {
    content: String,
    tool_calls: Vec<ResolvedToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

/// How the loop ended without error.
#[derive(Debug)]
struct Finished {
    message: ChatMessage,
    finish_reason: Option<FinishReason>,
    safety_limit: bool,
}

/// Mutable pieces of one request shared by the loop steps.
struct RunContext<'a> {
    request: &'a ConductorRequest,
    request_id: String,
    state: IterationState,
    selector: ProviderSelector,
    usage: Option<Usage>,
    sink: EventSink,
    token: CancellationToken,
}

impl RunContext<'_> {
    fn add_usage(&mut self, usage: Option<Usage>) {
        if let Some(u) = usage {
            self.usage.get_or_insert_with(Usage::default).merge(&u);
        }
    }
}

pub(super) async fn execute(
    conductor: &Conductor,
    request: ConductorRequest,
    events: mpsc::Sender<ConductorEvent>,
) -> ConductorOutcome {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!(
        "conductor",
        request_id = %request_id,
        providers = request.providers.len(),
        tools = request.tools.len()
    );
    execute_inner(conductor, request, events, request_id)
        .instrument(span)
        .await
}

async fn execute_inner(
    conductor: &Conductor,
    request: ConductorRequest,
    events: mpsc::Sender<ConductorEvent>,
    request_id: String,
) -> ConductorOutcome {
    let options = &conductor.options;
    let token = request.cancel.child_token();
    let hint = request
        .complexity
        .unwrap_or_else(|| derive_complexity(&request.messages, &request.tools));

    let mut ctx = RunContext {
        request: &request,
        request_id,
        state: IterationState::new(request.messages.clone(), options.hard_max_iterations),
        selector: ProviderSelector::new(&request.providers, hint),
        usage: None,
        sink: EventSink::new(events, token.clone()),
        token: token.clone(),
    };

    tracing::info!(complexity = ?hint, messages = request.messages.len(), "conductor request started");

    let watcher = ctx.sink.clone();
    let result = match validate_conversation(&request.messages).and_then(|()| options.validate()) {
        Err(e) => Err(e),
        Ok(()) => {
            let driving = drive(conductor, &mut ctx);
            tokio::pin!(driving);
            let deadline = tokio::time::sleep(options.request_timeout);
            tokio::pin!(deadline);

            tokio::select! {
                biased;
                _ = watcher.closed() => {
                    tracing::info!("client disconnected; cancelling request");
                    token.cancel();
                    wind_down(driving.as_mut()).await;
                    Err(ConductorError::Cancelled)
                }
                _ = &mut deadline => {
                    token.cancel();
                    wind_down(driving.as_mut()).await;
                    Err(ConductorError::Timeout(options.request_timeout))
                }
                result = &mut driving => result,
            }
        }
    };
    // A client abort observed as some other failure is still a cancellation.
    let result = match result {
        Err(e) if request.cancel.is_cancelled() && !matches!(e, ConductorError::Timeout(_)) => {
            Err(ConductorError::Cancelled)
        }
        other => other,
    };

    finish(ctx, result).await
}

/// Let a cancelled drive unwind through its own cancellation checks so
/// in-flight tools can clean up, dropping it after the grace period.
async fn wind_down<F: Future>(driving: Pin<&mut F>) {
    if tokio::time::timeout(defaults::timeouts::CANCEL_GRACE, driving)
        .await
        .is_err()
    {
        tracing::warn!("request did not unwind within the cancellation grace period");
    }
}

async fn finish(mut ctx: RunContext<'_>, result: Result<Finished, ConductorError>) -> ConductorOutcome {
    match result {
        Ok(done) => {
            let terminal = if done.safety_limit {
                ConductorState::TerminatedSafetyLimit
            } else {
                ConductorState::TerminatedSuccess
            };
            ctx.state.transition(terminal);
            tracing::info!(
                state = %terminal,
                iterations = ctx.state.iteration_count,
                provider_requests = ctx.state.provider_requests,
                "conductor request finished"
            );

            ctx.sink
                .emit(ConductorEvent::MessageComplete {
                    message: done.message.clone(),
                    finish_reason: done.finish_reason,
                })
                .await;
            if let Some(state) = terminal.terminal_state() {
                ctx.sink
                    .emit(ConductorEvent::Complete {
                        state,
                        iterations: ctx.state.iteration_count,
                        usage: ctx.usage,
                    })
                    .await;
            }

            ConductorOutcome {
                state: terminal,
                iterations: ctx.state.iteration_count,
                messages: ctx.state.current_messages,
                final_message: Some(done.message),
                usage: ctx.usage,
                error: None,
            }
        }
        Err(error) => {
            let cause = TerminationCause::from_error(&error);
            let terminal = ConductorState::TerminatedError(cause);
            ctx.state.transition(terminal);
            match cause {
                TerminationCause::Cancelled => {
                    tracing::info!(iterations = ctx.state.iteration_count, "conductor request cancelled");
                }
                _ => tracing::error!(
                    error = %error,
                    iterations = ctx.state.iteration_count,
                    "conductor request failed"
                ),
            }

            ctx.sink
                .emit(ConductorEvent::Error {
                    kind: error.kind().to_string(),
                    message: error.to_string(),
                    attempts: error.attempts().to_vec(),
                })
                .await;

            ConductorOutcome {
                state: terminal,
                iterations: ctx.state.iteration_count,
                messages: ctx.state.current_messages,
                final_message: None,
                usage: ctx.usage,
                error: Some(error),
            }
        }
    }
}

async fn drive(conductor: &Conductor, ctx: &mut RunContext<'_>) -> Result<Finished, ConductorError> {
    let policy = conductor.stop_policy();

    loop {
        ctx.state.iteration_count += 1;
        let iteration = ctx.state.iteration_count;

        let (target, mut turn) = stream_with_failover(conductor, ctx).await?;
        ctx.add_usage(turn.usage.take());

        ctx.state.transition(ConductorState::Evaluating);
        if conductor.options.validate_tool_arguments {
            validate_calls(&mut turn.tool_calls, &ctx.request.tools);
        }
        ctx.state.finish_reason = turn.finish_reason.clone();
        ctx.state.last_assistant_content_length = turn.content.chars().count();

        let decision = policy.evaluate(&StopInput {
            content: &turn.content,
            tool_calls: &turn.tool_calls,
            finish_reason: turn.finish_reason.as_ref(),
            iteration,
        });
        tracing::debug!(
            iteration,
            provider = target.id(),
            content_chars = ctx.state.last_assistant_content_length,
            tool_calls = turn.tool_calls.len(),
            finish_reason = ?turn.finish_reason,
            terminal = decision.is_terminal(),
            "turn evaluated"
        );

        if let StopDecision::Terminate { reason, content } = decision {
            if reason == StopReason::SafetyLimit {
                tracing::warn!(iteration, "safety iteration cap reached");
            }
            let message = ChatMessage::assistant(content);
            ctx.state.current_messages.push(message.clone());
            return Ok(Finished {
                message,
                finish_reason: turn.finish_reason,
                safety_limit: reason == StopReason::SafetyLimit,
            });
        }

        ctx.state.transition(ConductorState::ExecutingTools);
        ctx.sink
            .emit(ConductorEvent::Status {
                message: format!("executing {} tool call(s)", turn.tool_calls.len()),
                iteration,
                provider: None,
                model: None,
            })
            .await;

        let tool_context = ToolContext {
            request_id: ctx.request_id.clone(),
            data: ctx.request.context.clone(),
            messages: Arc::from(ctx.state.current_messages.as_slice()),
        };
        let outcomes = conductor
            .gateway
            .execute_all(&turn.tool_calls, &tool_context, &ctx.sink, &ctx.token)
            .await;
        if ctx.token.is_cancelled() {
            return Err(ConductorError::Cancelled);
        }

        let calls = turn.tool_calls.into_iter().map(|c| c.call).collect();
        ctx.state
            .current_messages
            .push(ChatMessage::assistant_with_tool_calls(turn.content, calls));
        ctx.state
            .current_messages
            .extend(outcomes.into_iter().map(|o| o.message));
    }
}

/// Select a provider and stream one turn, failing over until a provider
/// completes the turn or none is left.
async fn stream_with_failover(
    conductor: &Conductor,
    ctx: &mut RunContext<'_>,
) -> Result<(ProviderTarget, Turn), ConductorError> {
    let iteration = ctx.state.iteration_count;
    let request = ChatRequest {
        messages: ctx.state.current_messages.clone(),
        tools: ctx.request.tools.clone(),
    };

    loop {
        ctx.state.transition(ConductorState::SelectingProvider);
        if ctx.state.ceiling_reached() {
            tracing::warn!(
                provider_requests = ctx.state.provider_requests,
                "provider request ceiling reached"
            );
            return Err(ctx.selector.exhausted());
        }
        let target = ctx.selector.select()?;
        ctx.state.provider_requests += 1;

        tracing::info!(
            iteration,
            provider = target.id(),
            provider_type = %target.config.provider_type,
            model = %target.model,
            "provider selected"
        );
        ctx.sink
            .emit(ConductorEvent::Status {
                message: format!("requesting completion from {}", target.id()),
                iteration,
                provider: Some(target.id().to_string()),
                model: Some(target.model.clone()),
            })
            .await;

        ctx.state.transition(ConductorState::StreamingResponse);
        match stream_turn(conductor, &target, &request, iteration, &ctx.sink, &ctx.token).await {
            Ok(turn) => return Ok((target, turn)),
            Err(ConductorError::Provider(error)) => {
                ctx.selector.mark_failed(&target, &error);
                ctx.sink
                    .emit(ConductorEvent::Status {
                        message: format!(
                            "provider {} failed ({}); retrying turn with the next provider",
                            target.id(),
                            error.kind
                        ),
                        iteration,
                        provider: Some(target.id().to_string()),
                        model: Some(target.model.clone()),
                    })
                    .await;
            }
            Err(other) => return Err(other),
        }
    }
}

/// Stream one assistant turn, forwarding content deltas to the client.
async fn stream_turn(
    conductor: &Conductor,
    target: &ProviderTarget,
    request: &ChatRequest,
    iteration: u32,
    sink: &EventSink,
    token: &CancellationToken,
) -> Result<Turn, ConductorError> {
    let idle = conductor.options.stream_idle_timeout;
    let provider_id = target.id();

    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(ConductorError::Cancelled),
        opened = tokio::time::timeout(idle, conductor.transport.open_stream(target, request)) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream?,
        Err(_) => {
            return Err(ProviderError::timeout(
                provider_id,
                format!("no response within {}s", idle.as_secs()),
            )
            .into());
        }
    };

    let mut turn = Turn::default();
    let mut accumulator = ToolCallAccumulator::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ConductorError::Cancelled),
            next = tokio::time::timeout(idle, stream.next()) => next,
        };
        let item = match next {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(_) => {
                return Err(ProviderError::timeout(
                    provider_id,
                    format!("stream idle for {}s", idle.as_secs()),
                )
                .into());
            }
        };

        match item {
            Ok(delta) => {
                if let Some(content) = delta.content {
                    turn.content.push_str(&content);
                    let delivered = sink
                        .emit(ConductorEvent::Delta { content, iteration })
                        .await;
                    if !delivered {
                        return Err(ConductorError::Cancelled);
                    }
                }
                accumulator.extend(&delta.tool_calls);
                if delta.finish_reason.is_some() {
                    turn.finish_reason = delta.finish_reason;
                }
                if delta.usage.is_some() {
                    turn.usage = delta.usage;
                }
            }
            Err(ConductorError::StreamParse(e)) => {
                tracing::warn!(provider = provider_id, error = %e, "skipped malformed stream event");
            }
            Err(e) => return Err(e),
        }
    }

    turn.tool_calls = accumulator.finish();
    Ok(turn)
}
