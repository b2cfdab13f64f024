use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::config::ProviderType;
use crate::defaults;
use crate::error::{ProviderError, ProviderFailureKind, StreamParseError, ToolExecutionError};
use crate::providers::{ChatRequest, ProviderTarget};
use crate::tools::{ProgressReporter, ToolInvocation};
use crate::types::{
    DeltaStream, FinishReason, MessageRole, StreamDelta, TerminalState, ToolCallFragment,
};

enum Script {
    Deltas(Vec<Result<StreamDelta, ConductorError>>),
    Reject(ProviderError),
    /// Emits the deltas, then never finishes.
    Stall(Vec<StreamDelta>),
}

#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    requests: Mutex<Vec<(String, ChatRequest)>>,
}

impl ScriptedTransport {
    fn script(self, provider: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(provider.to_string())
            .or_default()
            .push_back(script);
        self
    }

    fn called(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    fn request(&self, n: usize) -> ChatRequest {
        self.requests.lock().unwrap()[n].1.clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open_stream(
        &self,
        target: &ProviderTarget,
        request: &ChatRequest,
    ) -> Result<DeltaStream, ConductorError> {
        self.requests
            .lock()
            .unwrap()
            .push((target.id().to_string(), request.clone()));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(target.id())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("no script left for {}", target.id()));
        match script {
            Script::Deltas(items) => Ok(Box::pin(stream::iter(items))),
            Script::Reject(err) => Err(err.into()),
            Script::Stall(items) => {
                let head = stream::iter(items.into_iter().map(Ok));
                Ok(Box::pin(futures::StreamExt::chain(head, stream::pending())))
            }
        }
    }
}

#[derive(Default)]
struct RecordingExecutor {
    executed: Mutex<Vec<String>>,
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(
        &self,
        invocation: ToolInvocation,
        progress: ProgressReporter,
        _cancel: CancellationToken,
    ) -> Result<String, ToolExecutionError> {
        self.executed.lock().unwrap().push(invocation.tool_name.clone());
        progress.report("searching", json!({})).await;
        match invocation.tool_name.as_str() {
            "broken" => Err(invocation.failure("backend unavailable")),
            name => Ok(format!("result of {name}")),
        }
    }
}

fn answer(text: &str) -> Script {
    Script::Deltas(vec![
        Ok(StreamDelta::content(text)),
        Ok(StreamDelta::finish(FinishReason::Stop)),
    ])
}

fn tool_turn(calls: &[(&str, &str, &str)]) -> Script {
    let mut items: Vec<_> = calls
        .iter()
        .enumerate()
        .map(|(index, (id, name, args))| {
            Ok(StreamDelta::tool_call(ToolCallFragment {
                index: Some(index),
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments: Some(args.to_string()),
            }))
        })
        .collect();
    items.push(Ok(StreamDelta::finish(FinishReason::ToolCalls)));
    Script::Deltas(items)
}

fn provider(id: &str, free: bool, priority: i32) -> ProviderConfig {
    let kind = if free { ProviderType::FreeTierGroq } else { ProviderType::OpenAi };
    ProviderConfig::new(id, kind, "key").with_priority(priority)
}

struct Harness {
    transport: Arc<ScriptedTransport>,
    executor: Arc<RecordingExecutor>,
    conductor: Conductor,
}

fn harness(transport: ScriptedTransport, options: ConductorOptions) -> Harness {
    let transport = Arc::new(transport);
    let executor = Arc::new(RecordingExecutor::default());
    let conductor = Conductor::new(transport.clone(), executor.clone(), options);
    Harness {
        transport,
        executor,
        conductor,
    }
}

async fn run(conductor: &Conductor, request: ConductorRequest) -> (ConductorOutcome, Vec<ConductorEvent>) {
    let (tx, mut rx) = mpsc::channel(256);
    let outcome = conductor.run(request, tx).await;
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    (outcome, events)
}

fn names(events: &[ConductorEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(ConductorEvent::name)
        .filter(|n| *n != "status")
        .collect()
}

fn user(text: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(text)]
}

#[tokio::test]
async fn answer_without_tools_ends_after_one_iteration() {
    let h = harness(
        ScriptedTransport::default().script("groq", answer("4")),
        ConductorOptions::default(),
    );
    let (outcome, events) = run(
        &h.conductor,
        ConductorRequest::new(user("2+2?"), vec![provider("groq", true, 1)]),
    )
    .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.final_message.as_ref().map(ChatMessage::text), Some("4"));
    assert_eq!(names(&events), ["delta", "message_complete", "complete"]);
    assert!(events.iter().all(|e| e.tool_call_id().is_none()));
}

#[tokio::test]
async fn tool_turn_appends_assistant_and_tool_messages() {
    let long_answer = "x".repeat(300);
    let h = harness(
        ScriptedTransport::default()
            .script("groq", tool_turn(&[("call_1", "search_web", r#"{"q":"cats"}"#)]))
            .script("groq", answer(&long_answer)),
        ConductorOptions::default(),
    );
    let (outcome, events) = run(
        &h.conductor,
        ConductorRequest::new(user("find cats"), vec![provider("groq", true, 1)]),
    )
    .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.iterations, 2);
    assert_eq!(
        names(&events),
        [
            "tool_call_start",
            "tool_call_progress",
            "tool_call_progress",
            "tool_call_result",
            "delta",
            "message_complete",
            "complete"
        ]
    );

    // Second request carries the assistant tool-call turn and its result.
    let second = h.transport.request(1);
    let roles: Vec<_> = second.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, [MessageRole::User, MessageRole::Assistant, MessageRole::Tool]);
    assert_eq!(second.messages[1].tool_calls[0].function.arguments, r#"{"q":"cats"}"#);
    assert!(second.messages[1].content.is_none());
    assert_eq!(second.messages[2].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(second.messages[2].text(), "result of search_web");
    assert_eq!(outcome.messages.len(), 4);
}

#[tokio::test]
async fn rate_limited_free_provider_is_not_retried() {
    let h = harness(
        ScriptedTransport::default()
            .script("free", Script::Reject(ProviderError::from_status("free", 429, "")))
            .script("paid", tool_turn(&[("c1", "search_web", "{}")]))
            .script("paid", answer("done")),
        ConductorOptions::default(),
    );
    let (outcome, events) = run(
        &h.conductor,
        ConductorRequest::new(
            user("hi"),
            vec![provider("paid", false, 2), provider("free", true, 1)],
        ),
    )
    .await;

    assert!(outcome.is_success());
    assert_eq!(h.transport.called(), ["free", "paid", "paid"]);
    assert_eq!(outcome.iterations, 2);
    assert!(events.iter().any(|e| matches!(
        e,
        ConductorEvent::Status { message, .. } if message.contains("failed (rate_limited)")
    )));
}

#[tokio::test]
async fn exhausted_pool_is_a_single_aggregated_error() {
    let h = harness(
        ScriptedTransport::default()
            .script("a", Script::Reject(ProviderError::from_status("a", 503, "overloaded")))
            .script("b", Script::Reject(ProviderError::network("b", "connection refused"))),
        ConductorOptions::default(),
    );
    let (outcome, events) = run(
        &h.conductor,
        ConductorRequest::new(user("hi"), vec![provider("a", true, 1), provider("b", false, 1)]),
    )
    .await;

    assert_eq!(
        outcome.state,
        ConductorState::TerminatedError(TerminationCause::NoProviderAvailable)
    );
    let last = events.last().unwrap();
    match last {
        ConductorEvent::Error { kind, attempts, message } => {
            assert_eq!(kind, "no_provider_available");
            assert_eq!(attempts.len(), 2);
            assert!(message.contains("overloaded"));
            assert!(message.contains("connection refused"));
        }
        other => panic!("expected error event, got {other:?}"),
    }
    assert!(!events.iter().any(|e| e.name() == "complete"));
}

#[tokio::test]
async fn truncated_stream_fails_over_and_supersedes_partial_content() {
    let h = harness(
        ScriptedTransport::default()
            .script(
                "free",
                Script::Deltas(vec![
                    Ok(StreamDelta::content("par")),
                    Err(ProviderError::truncated("free").into()),
                ]),
            )
            .script("paid", answer("full answer")),
        ConductorOptions::default(),
    );
    let (outcome, _) = run(
        &h.conductor,
        ConductorRequest::new(user("hi"), vec![provider("free", true, 1), provider("paid", false, 1)]),
    )
    .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.final_message.unwrap().text(), "full answer");
    assert_eq!(outcome.iterations, 1);
}

#[tokio::test]
async fn safety_cap_ends_loop_with_fallback_message() {
    let mut transport = ScriptedTransport::default();
    for i in 0..3 {
        transport = transport.script("groq", tool_turn(&[(&format!("c{i}"), "search_web", "{}")]));
    }
    let h = harness(
        transport,
        ConductorOptions::default().with_safety_iteration_cap(3),
    );
    let (outcome, events) = run(
        &h.conductor,
        ConductorRequest::new(user("loop"), vec![provider("groq", true, 1)]),
    )
    .await;

    assert_eq!(outcome.state, ConductorState::TerminatedSafetyLimit);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(
        outcome.final_message.unwrap().text(),
        defaults::SAFETY_LIMIT_FALLBACK_MESSAGE
    );
    // Tools ran for the first two turns only.
    assert_eq!(h.executor.executed.lock().unwrap().len(), 2);
    assert!(events.iter().any(|e| matches!(
        e,
        ConductorEvent::Complete { state: TerminalState::SafetyLimit, iterations: 3, .. }
    )));
}

#[tokio::test]
async fn bad_arguments_and_failing_tools_do_not_abort_siblings() {
    let h = harness(
        ScriptedTransport::default()
            .script(
                "groq",
                tool_turn(&[
                    ("ok", "search_web", r#"{"query":"a"}"#),
                    ("bad", "search_web", r#"{"query":"#),
                    ("err", "broken", "{}"),
                ]),
            )
            .script("groq", answer("summary")),
        ConductorOptions::default(),
    );
    let (outcome, _) = run(
        &h.conductor,
        ConductorRequest::new(user("go"), vec![provider("groq", true, 1)]),
    )
    .await;

    assert!(outcome.is_success());
    assert_eq!(*h.executor.executed.lock().unwrap(), ["search_web", "broken"]);

    let tool_messages: Vec<_> = h
        .transport
        .request(1)
        .messages
        .into_iter()
        .filter(|m| m.role == MessageRole::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 3);
    assert_eq!(tool_messages[0].text(), "result of search_web");
    assert!(tool_messages[1].text().contains("invalid_arguments"));
    assert!(tool_messages[2].text().contains("backend unavailable"));
}

#[tokio::test]
async fn schema_violations_fail_the_call() {
    let h = harness(
        ScriptedTransport::default()
            .script("groq", tool_turn(&[("c1", "search_web", r#"{"query":42}"#)]))
            .script("groq", answer("sorry")),
        ConductorOptions::default(),
    );
    let tools = vec![Tool::function(
        "search_web",
        "Search",
        json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
    )];
    let (outcome, _) = run(
        &h.conductor,
        ConductorRequest::new(user("go"), vec![provider("groq", true, 1)]).with_tools(tools),
    )
    .await;

    assert!(outcome.is_success());
    assert!(h.executor.executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_events_are_skipped() {
    let h = harness(
        ScriptedTransport::default().script(
            "groq",
            Script::Deltas(vec![
                Ok(StreamDelta::content("a")),
                Err(StreamParseError::new("bad json", "{oops").into()),
                Ok(StreamDelta::content("b")),
                Ok(StreamDelta::finish(FinishReason::Stop)),
            ]),
        ),
        ConductorOptions::default(),
    );
    let (outcome, _) = run(
        &h.conductor,
        ConductorRequest::new(user("hi"), vec![provider("groq", true, 1)]),
    )
    .await;
    assert_eq!(outcome.final_message.unwrap().text(), "ab");
}

#[tokio::test]
async fn cancellation_ends_without_success_events() {
    let h = harness(
        ScriptedTransport::default().script("groq", Script::Stall(vec![StreamDelta::content("thinking")])),
        ConductorOptions::default(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let (outcome, events) = run(
        &h.conductor,
        ConductorRequest::new(user("hi"), vec![provider("groq", true, 1)]).with_cancel(cancel),
    )
    .await;

    assert_eq!(outcome.state, ConductorState::TerminatedError(TerminationCause::Cancelled));
    assert!(!events.iter().any(|e| matches!(e.name(), "complete" | "message_complete")));
    assert!(matches!(events.last(), Some(ConductorEvent::Error { kind, .. }) if kind == "cancelled"));
}

/// Blocks until cancelled, then records that its checkpoint ran.
#[derive(Default)]
struct BlockingExecutor {
    started: tokio::sync::Notify,
    observed_cancel: AtomicBool,
}

#[async_trait]
impl ToolExecutor for BlockingExecutor {
    async fn execute(
        &self,
        invocation: ToolInvocation,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<String, ToolExecutionError> {
        progress.report("downloading", json!({})).await;
        self.started.notify_one();
        cancel.cancelled().await;
        tokio::task::yield_now().await;
        self.observed_cancel.store(true, Ordering::SeqCst);
        Err(invocation.cancelled())
    }
}

#[tokio::test]
async fn cancellation_while_executing_tools_reaches_the_tool() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .script("groq", tool_turn(&[("call_1", "transcribe", r#"{"url":"a.mp3"}"#)])),
    );
    let executor = Arc::new(BlockingExecutor::default());
    let conductor = Conductor::new(transport.clone(), executor.clone(), ConductorOptions::default());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let running = executor.clone();
    tokio::spawn(async move {
        running.started.notified().await;
        trigger.cancel();
    });

    let (outcome, events) = run(
        &conductor,
        ConductorRequest::new(user("transcribe a.mp3"), vec![provider("groq", true, 1)])
            .with_cancel(cancel),
    )
    .await;

    assert_eq!(outcome.state, ConductorState::TerminatedError(TerminationCause::Cancelled));
    assert!(executor.observed_cancel.load(Ordering::SeqCst));
    assert_eq!(transport.called(), ["groq"]);
    assert!(!events.iter().any(|e| matches!(e.name(), "complete" | "message_complete")));
    assert!(events.iter().any(|e| matches!(
        e,
        ConductorEvent::ToolCallResult { tool_call_id, is_error: true, .. } if tool_call_id == "call_1"
    )));
    assert!(matches!(events.last(), Some(ConductorEvent::Error { kind, .. }) if kind == "cancelled"));
}

#[tokio::test]
async fn client_disconnect_during_tools_lets_the_tool_unwind() {
    use futures::StreamExt;

    let transport = Arc::new(
        ScriptedTransport::default()
            .script("groq", tool_turn(&[("call_1", "transcribe", r#"{"url":"a.mp3"}"#)])),
    );
    let executor = Arc::new(BlockingExecutor::default());
    let conductor = Conductor::new(transport, executor.clone(), ConductorOptions::default());

    let mut events = conductor.stream(ConductorRequest::new(
        user("transcribe a.mp3"),
        vec![provider("groq", true, 1)],
    ));
    while let Some(event) = events.next().await {
        if event.name() == "tool_call_start" {
            break;
        }
    }
    executor.started.notified().await;
    drop(events);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !executor.observed_cancel.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test(start_paused = true)]
async fn idle_stream_times_out_and_fails_over() {
    let h = harness(
        ScriptedTransport::default()
            .script("slow", Script::Stall(Vec::new()))
            .script("fast", answer("ok")),
        ConductorOptions::default().with_stream_idle_timeout(Duration::from_secs(5)),
    );
    let (outcome, _) = run(
        &h.conductor,
        ConductorRequest::new(user("hi"), vec![provider("slow", true, 1), provider("fast", false, 1)]),
    )
    .await;

    assert!(outcome.is_success());
    assert_eq!(h.transport.called(), ["slow", "fast"]);
}

#[tokio::test(start_paused = true)]
async fn request_timeout_is_terminal() {
    let h = harness(
        ScriptedTransport::default().script("groq", Script::Stall(vec![StreamDelta::content("…")])),
        ConductorOptions::default()
            .with_stream_idle_timeout(Duration::from_secs(120))
            .with_request_timeout(Duration::from_secs(30)),
    );
    let (outcome, events) = run(
        &h.conductor,
        ConductorRequest::new(user("hi"), vec![provider("groq", true, 1)]),
    )
    .await;

    assert_eq!(outcome.state, ConductorState::TerminatedError(TerminationCause::TimedOut));
    assert!(matches!(events.last(), Some(ConductorEvent::Error { kind, .. }) if kind == "timeout"));
}

#[tokio::test]
async fn invalid_conversation_is_rejected_before_any_request() {
    let h = harness(ScriptedTransport::default(), ConductorOptions::default());
    let messages = vec![ChatMessage::user("hi"), ChatMessage::tool("ghost", "search_web", "{}")];
    let (outcome, _) = run(
        &h.conductor,
        ConductorRequest::new(messages, vec![provider("groq", true, 1)]),
    )
    .await;

    assert_eq!(outcome.state, ConductorState::TerminatedError(TerminationCause::Fatal));
    assert!(matches!(outcome.error, Some(ConductorError::InvalidRequest(_))));
    assert!(h.transport.called().is_empty());
}

#[tokio::test]
async fn provider_request_ceiling_bounds_failover() {
    let mut transport = ScriptedTransport::default();
    let mut pool = Vec::new();
    for i in 0..4 {
        let id = format!("p{i}");
        transport = transport.script(&id, Script::Reject(ProviderError::from_status(&id, 500, "")));
        pool.push(provider(&id, false, i));
    }
    let h = harness(
        transport,
        ConductorOptions::default()
            .with_safety_iteration_cap(2)
            .with_hard_max_iterations(2),
    );
    let (outcome, _) = run(&h.conductor, ConductorRequest::new(user("hi"), pool)).await;

    assert_eq!(h.transport.called().len(), 2);
    match outcome.error {
        Some(ConductorError::NoProviderAvailable { attempts }) => {
            assert_eq!(attempts.len(), 2);
            assert!(attempts.iter().all(|a| a.kind == ProviderFailureKind::ServerError));
        }
        other => panic!("expected aggregated error, got {other:?}"),
    }
}

#[tokio::test]
async fn usage_is_aggregated_across_iterations() {
    let with_usage = |script: Script, prompt: u32| match script {
        Script::Deltas(mut items) => {
            items.push(Ok(StreamDelta {
                usage: Some(crate::types::Usage::new(prompt, 5)),
                ..Default::default()
            }));
            Script::Deltas(items)
        }
        other => other,
    };
    let h = harness(
        ScriptedTransport::default()
            .script("groq", with_usage(tool_turn(&[("c1", "search_web", "{}")]), 10))
            .script("groq", with_usage(answer("done"), 20)),
        ConductorOptions::default(),
    );
    let (outcome, _) = run(
        &h.conductor,
        ConductorRequest::new(user("hi"), vec![provider("groq", true, 1)]),
    )
    .await;

    let usage = outcome.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 30);
    assert_eq!(usage.completion_tokens, 10);
}

#[tokio::test]
async fn dropping_the_event_stream_cancels_the_request() {
    use futures::StreamExt;

    let h = harness(
        ScriptedTransport::default().script("groq", Script::Stall(vec![StreamDelta::content("x")])),
        ConductorOptions::default(),
    );
    let cancel = CancellationToken::new();
    let request = ConductorRequest::new(user("hi"), vec![provider("groq", true, 1)])
        .with_cancel(cancel.clone());

    let mut events = h.conductor.stream(request);
    // Status, then the first delta.
    while let Some(event) = events.next().await {
        if event.name() == "delta" {
            break;
        }
    }
    drop(events);

    // The stalled read only ends through the disconnect watcher.
    tokio::time::timeout(Duration::from_secs(5), async {
        while Arc::strong_count(&h.transport) > 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(!cancel.is_cancelled(), "caller token is only observed, never cancelled");
}

#[tokio::test]
async fn cancel_handle_aborts_streamed_request() {
    use futures::StreamExt;

    let h = harness(
        ScriptedTransport::default().script("groq", Script::Stall(vec![StreamDelta::content("x")])),
        ConductorOptions::default(),
    );
    let (mut events, handle) = h
        .conductor
        .stream_cancellable(ConductorRequest::new(user("hi"), vec![provider("groq", true, 1)]));

    let mut seen = Vec::new();
    while let Some(event) = events.next().await {
        if event.name() == "delta" {
            handle.cancel();
        }
        seen.push(event);
    }

    assert!(matches!(seen.last(), Some(ConductorEvent::Error { kind, .. }) if kind == "cancelled"));
    assert!(!seen.iter().any(|e| e.name() == "complete"));
}
