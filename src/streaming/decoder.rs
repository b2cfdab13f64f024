//! Stream Decoder
//!
//! Turns the SSE byte stream of one provider response into `StreamDelta`s.
//! `eventsource-stream` buffers partial lines and split UTF-8 sequences until a
//! full event boundary is seen; the converter then maps each event's JSON
//! payload onto a delta.

use std::fmt;
use std::sync::Arc;

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::Stream;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::error::{ConductorError, ProviderError, ProviderFailureKind, StreamParseError};
use crate::providers::ProviderAdapter;
use crate::types::{DeltaStream, MessageRole, StreamDelta, ToolCallFragment, Usage};

/// Payload that ends an OpenAI-style stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Converts provider SSE events into deltas.
pub trait SseEventConverter: Send + Sync {
    /// Provider the converted events are attributed to.
    fn provider_id(&self) -> &str;

    /// Convert one non-empty, non-`[DONE]` event into zero or more deltas.
    ///
    /// `Err(ConductorError::StreamParse)` is recoverable; a returned
    /// `Err(ConductorError::Provider)` ends the stream.
    fn convert_event(&self, event: &Event) -> Vec<Result<StreamDelta, ConductorError>>;

    /// Called when the byte stream ends without `[DONE]`.
    ///
    /// `finished` tells whether any delta carried a finish reason.
    fn handle_stream_end(&self, finished: bool) -> Option<Result<StreamDelta, ConductorError>> {
        let _ = finished;
        None
    }
}

/// Decode an SSE byte stream into a lazy, finite delta stream.
pub fn decode_sse<S, B, E>(bytes: S, converter: Arc<dyn SseEventConverter>) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut events = Box::pin(bytes.eventsource());
        let mut finished = false;

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    let data = event.data.trim();
                    if data.is_empty() {
                        continue;
                    }
                    if data == DONE_SENTINEL {
                        return;
                    }
                    for result in converter.convert_event(&event) {
                        let terminal = matches!(result, Err(ConductorError::Provider(_)));
                        if let Ok(delta) = &result {
                            finished |= delta.finish_reason.is_some();
                        }
                        yield result;
                        if terminal {
                            return;
                        }
                    }
                }
                Err(EventStreamError::Transport(e)) => {
                    yield Err(ConductorError::Provider(ProviderError::network(
                        converter.provider_id(),
                        format!("stream interrupted: {e}"),
                    )));
                    return;
                }
                Err(EventStreamError::Utf8(e)) => {
                    yield Err(StreamParseError::new(format!("invalid UTF-8 in event: {e}"), "").into());
                }
                Err(EventStreamError::Parser(e)) => {
                    yield Err(StreamParseError::new(format!("invalid SSE framing: {e}"), "").into());
                }
            }
        }

        if let Some(end) = converter.handle_stream_end(finished) {
            yield end;
        }
    })
}

#[derive(Debug, Deserialize)]
struct ChunkEvent {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChunkUsage>,
    /// Groq reports usage under its own extension object.
    x_groq: Option<GroqExtension>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    role: Option<String>,
    content: Option<String>,
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GroqExtension {
    usage: Option<ChunkUsage>,
}

impl From<ChunkUsage> for Usage {
    fn from(u: ChunkUsage) -> Self {
        let mut usage = Usage::new(u.prompt_tokens, u.completion_tokens);
        if let Some(total) = u.total_tokens {
            usage.total_tokens = total;
        }
        usage
    }
}

/// Converter for OpenAI-compatible `chat.completion.chunk` events.
#[derive(Debug, Clone)]
pub struct ChatChunkConverter {
    provider_id: String,
    adapter: ProviderAdapter,
}

impl ChatChunkConverter {
    pub fn new(provider_id: impl Into<String>, adapter: ProviderAdapter) -> Self {
        Self {
            provider_id: provider_id.into(),
            adapter,
        }
    }

    fn convert_chunk(&self, chunk: ChunkEvent) -> Result<StreamDelta, ConductorError> {
        if let Some(err) = chunk.error {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(ProviderError::new(
                self.provider_id.clone(),
                ProviderFailureKind::ServerError,
                message,
            )
            .into());
        }

        let mut out = StreamDelta {
            usage: chunk
                .usage
                .or_else(|| chunk.x_groq.and_then(|x| x.usage))
                .map(Usage::from),
            ..Default::default()
        };

        // Only the first choice is requested (n = 1).
        if let Some(choice) = chunk.choices.into_iter().next() {
            out.finish_reason = choice
                .finish_reason
                .as_deref()
                .map(|raw| self.adapter.finish_reason(raw));
            if let Some(delta) = choice.delta {
                out.role = delta.role.as_deref().and_then(parse_role);
                out.content = delta.content.filter(|c| !c.is_empty());
                out.tool_calls = delta
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| {
                        let (name, arguments) = match tc.function {
                            Some(f) => (f.name, f.arguments),
                            None => (None, None),
                        };
                        ToolCallFragment {
                            index: tc.index,
                            id: tc.id.filter(|id| !id.is_empty()),
                            name: name.filter(|n| !n.is_empty()),
                            arguments,
                        }
                    })
                    .collect();
            }
        }
        Ok(out)
    }
}

fn parse_role(raw: &str) -> Option<MessageRole> {
    match raw {
        "assistant" => Some(MessageRole::Assistant),
        "system" => Some(MessageRole::System),
        "user" => Some(MessageRole::User),
        "tool" => Some(MessageRole::Tool),
        _ => None,
    }
}

impl SseEventConverter for ChatChunkConverter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn convert_event(&self, event: &Event) -> Vec<Result<StreamDelta, ConductorError>> {
        let chunk = match serde_json::from_str::<ChunkEvent>(&event.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(
                    provider = %self.provider_id,
                    error = %e,
                    "skipping malformed stream event"
                );
                return vec![Err(StreamParseError::new(
                    format!("failed to parse chunk: {e}"),
                    &event.data,
                )
                .into())];
            }
        };
        match self.convert_chunk(chunk) {
            Ok(delta) if delta.is_empty() => Vec::new(),
            other => vec![other],
        }
    }

    fn handle_stream_end(&self, finished: bool) -> Option<Result<StreamDelta, ConductorError>> {
        (!finished).then(|| Err(ProviderError::truncated(self.provider_id.clone()).into()))
    }
}
