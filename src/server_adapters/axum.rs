//! Axum-specific server adapters
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::{Json, Router, routing::post};
//! use axum::response::IntoResponse;
//! use tool_conductor::prelude::*;
//! use tool_conductor::server_adapters::{SseOptions, axum::to_sse_response};
//!
//! async fn chat(Json(messages): Json<Vec<ChatMessage>>) -> impl IntoResponse {
//!     let conductor = Conductor::http(Arc::new(ToolRegistry::new()), ConductorOptions::default())
//!         .expect("http client");
//!     let request = ConductorRequest::new(messages, Vec::new());
//!     to_sse_response(conductor.stream(request), SseOptions::production())
//! }
//!
//! let app: Router = Router::new().route("/chat", post(chat));
//! ```

use std::convert::Infallible;
use std::pin::Pin;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};

use crate::server_adapters::SseOptions;
use crate::types::{ConductorEvent, EventStream};

/// Convert a conductor `EventStream` into an Axum SSE response.
///
/// Dropping the response body (client disconnect) drops the event stream,
/// which cancels the running request.
pub fn to_sse_response(
    events: EventStream,
    opts: SseOptions,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    let stream = events.filter_map(move |event| {
        let event = opts.prepare(event).map(|e| Ok(to_axum_event(&e)));
        async move { event }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_axum_event(event: &ConductorEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.name()).data(data)
}

/// Convert a conductor `EventStream` into a plain text body stream.
///
/// Only assistant deltas are forwarded; an error event is rendered inline.
pub fn to_text_stream(
    events: EventStream,
) -> Pin<Box<dyn Stream<Item = Result<String, Infallible>> + Send>> {
    let text = events.filter_map(|event| async move {
        match event {
            ConductorEvent::Delta { content, .. } => Some(Ok(content)),
            ConductorEvent::Error { kind, .. } => Some(Ok(format!("\n[error: {kind}]\n"))),
            _ => None,
        }
    });
    Box::pin(text)
}
