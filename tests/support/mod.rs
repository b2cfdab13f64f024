//! Shared helpers: SSE fixtures, wiremock providers and event collection
#![allow(dead_code)]

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tool_conductor::prelude::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Load an `.sse` fixture from `tests/fixtures`.
pub fn load_sse_fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("fixture {path}: {e}"))
        .replace("\r\n", "\n")
}

/// Render chunks as an SSE body terminated by `[DONE]`.
pub fn sse_body(chunks: &[Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn chunk(delta: Value, finish_reason: Option<&str>) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}],
    })
}

pub fn content_chunk(text: &str) -> Value {
    chunk(json!({"content": text}), None)
}

pub fn tool_call_chunk(index: usize, id: Option<&str>, name: Option<&str>, arguments: &str) -> Value {
    let mut call = json!({"index": index, "function": {"arguments": arguments}});
    if let Some(id) = id {
        call["id"] = json!(id);
        call["type"] = json!("function");
    }
    if let Some(name) = name {
        call["function"]["name"] = json!(name);
    }
    chunk(json!({"tool_calls": [call]}), None)
}

pub fn finish_chunk(reason: &str) -> Value {
    chunk(json!({}), Some(reason))
}

/// A plain answer turn.
pub fn answer_body(text: &str) -> String {
    sse_body(&[content_chunk(text), finish_chunk("stop")])
}

/// A turn that only requests one tool call.
pub fn tool_turn_body(id: &str, name: &str, arguments: &str) -> String {
    sse_body(&[
        tool_call_chunk(0, Some(id), Some(name), ""),
        tool_call_chunk(0, None, None, arguments),
        finish_chunk("tool_calls"),
    ])
}

pub fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

/// Serve `body` once on `{prefix}/chat/completions`; mocks answer in mount order.
pub async fn mount_once(server: &MockServer, prefix: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(format!("{prefix}/chat/completions")))
        .respond_with(response)
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Provider pointed at the mock server under `prefix`.
pub fn mock_provider(
    id: &str,
    provider_type: ProviderType,
    server: &MockServer,
    prefix: &str,
) -> ProviderConfig {
    ProviderConfig::new(id, provider_type, format!("key-{id}"))
        .with_endpoint(format!("{}{prefix}", server.uri()))
}

/// JSON bodies of every request the server received under `prefix`.
pub async fn request_bodies(server: &MockServer, prefix: &str) -> Vec<Value> {
    let wanted = format!("{prefix}/chat/completions");
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == wanted)
        .map(|r| serde_json::from_slice(&r.body).expect("json request body"))
        .collect()
}

/// Run a request to completion and collect every emitted event.
pub async fn run_collect(
    conductor: &Conductor,
    request: ConductorRequest,
) -> (ConductorOutcome, Vec<ConductorEvent>) {
    let (tx, mut rx) = mpsc::channel(512);
    let outcome = conductor.run(request, tx).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (outcome, events)
}

pub fn event_names(events: &[ConductorEvent]) -> Vec<&'static str> {
    events.iter().map(ConductorEvent::name).collect()
}
