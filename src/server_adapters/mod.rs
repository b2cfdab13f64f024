//! Server adapters: turn a conductor `EventStream` into client responses
//!
//! Every [`ConductorEvent`] becomes one SSE frame whose `event:` line is the
//! event name and whose `data:` line is the JSON-serialized event.
//!
//! ## Example (Framework-agnostic)
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use tool_conductor::server_adapters::{SseOptions, sse_frames};
//! use tool_conductor::types::EventStream;
//!
//! async fn forward(events: EventStream) {
//!     let mut frames = sse_frames(events, SseOptions::production());
//!     while let Some(frame) = frames.next().await {
//!         print!("{frame}");
//!     }
//! }
//! ```

use std::pin::Pin;

use futures::{Stream, StreamExt};

use crate::types::{ConductorEvent, EventStream};

#[cfg(feature = "server-adapters")]
pub mod axum;

/// Options for SSE encoding.
#[derive(Debug, Clone)]
pub struct SseOptions {
    /// Whether to forward `status` lifecycle events.
    /// Default: `true`
    pub include_status: bool,

    /// Whether to forward `tool_call_progress` events.
    /// Default: `true`
    pub include_progress: bool,

    /// Whether to mask error messages and per-provider attempts.
    ///
    /// The error `kind` is always kept so clients can branch on it.
    /// Default: `true`
    pub mask_errors: bool,

    /// Message used when `mask_errors` is `true`; `"internal error"` when `None`.
    pub masked_error_message: Option<String>,
}

impl Default for SseOptions {
    fn default() -> Self {
        Self {
            include_status: true,
            include_progress: true,
            mask_errors: true,
            masked_error_message: None,
        }
    }
}

impl SseOptions {
    /// Create options suitable for development (errors not masked).
    pub fn development() -> Self {
        Self {
            mask_errors: false,
            ..Default::default()
        }
    }

    /// Create options suitable for production (errors masked).
    pub fn production() -> Self {
        Self {
            mask_errors: true,
            ..Default::default()
        }
    }

    /// Only content, tool lifecycle and terminal events.
    pub fn minimal() -> Self {
        Self {
            include_status: false,
            include_progress: false,
            ..Default::default()
        }
    }

    /// Apply the filtering and masking rules; `None` drops the event.
    pub fn prepare(&self, event: ConductorEvent) -> Option<ConductorEvent> {
        match event {
            ConductorEvent::Status { .. } if !self.include_status => None,
            ConductorEvent::ToolCallProgress(_) if !self.include_progress => None,
            ConductorEvent::Error { kind, .. } if self.mask_errors => Some(ConductorEvent::Error {
                kind,
                message: self
                    .masked_error_message
                    .clone()
                    .unwrap_or_else(|| "internal error".to_string()),
                attempts: Vec::new(),
            }),
            other => Some(other),
        }
    }
}

/// Encode one event as an SSE frame (`event: X\ndata: {...}\n\n`).
pub fn encode_frame(event: &ConductorEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("event: {}\ndata: {}\n\n", event.name(), data)
}

/// Convert an `EventStream` into SSE frames.
///
/// The consumer can write each yielded string to the HTTP response body.
pub fn sse_frames(
    events: EventStream,
    opts: SseOptions,
) -> Pin<Box<dyn Stream<Item = String> + Send>> {
    Box::pin(events.filter_map(move |event| {
        let frame = opts.prepare(event).map(|e| encode_frame(&e));
        async move { frame }
    }))
}

/// Convert an `EventStream` into a plain text stream of assistant deltas.
pub fn text_stream(mut events: EventStream) -> Pin<Box<dyn Stream<Item = String> + Send>> {
    let s = async_stream::stream! {
        while let Some(event) = events.next().await {
            if let ConductorEvent::Delta { content, .. } = event {
                yield content;
            }
        }
    };
    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderFailureKind;
    use crate::config::ProviderType;
    use crate::error::ProviderFailure;
    use crate::types::{ProgressEvent, TerminalState};
    use serde_json::Value;

    fn events(items: Vec<ConductorEvent>) -> EventStream {
        Box::pin(futures::stream::iter(items))
    }

    fn failure_event() -> ConductorEvent {
        ConductorEvent::Error {
            kind: "no_provider_available".into(),
            message: "groq: rate_limited".into(),
            attempts: vec![ProviderFailure {
                provider_id: "groq".into(),
                provider_type: ProviderType::FreeTierGroq,
                model: "llama-3.3-70b-versatile".into(),
                kind: ProviderFailureKind::RateLimited,
                status: Some(429),
                reason: "slow down".into(),
            }],
        }
    }

    #[test]
    fn frame_has_event_name_and_json_data() {
        let frame = encode_frame(&ConductorEvent::Delta {
            content: "4".into(),
            iteration: 1,
        });
        assert!(frame.starts_with("event: delta\ndata: "));
        assert!(frame.ends_with("\n\n"));
        let data = frame.lines().nth(1).unwrap().trim_start_matches("data: ");
        let json: Value = serde_json::from_str(data).unwrap();
        assert_eq!(json["content"], "4");
    }

    #[tokio::test]
    async fn production_masks_error_details() {
        let frames: Vec<String> = sse_frames(events(vec![failure_event()]), SseOptions::production())
            .collect()
            .await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("no_provider_available"));
        assert!(frames[0].contains("internal error"));
        assert!(!frames[0].contains("slow down"));
    }

    #[tokio::test]
    async fn development_keeps_attempts() {
        let frames: Vec<String> = sse_frames(events(vec![failure_event()]), SseOptions::development())
            .collect()
            .await;
        assert!(frames[0].contains("slow down"));
    }

    #[tokio::test]
    async fn minimal_drops_status_and_progress() {
        let input = vec![
            ConductorEvent::Status {
                message: "requesting".into(),
                iteration: 1,
                provider: None,
                model: None,
            },
            ConductorEvent::ToolCallProgress(ProgressEvent::new("c", "t", "chunking", Value::Null)),
            ConductorEvent::Complete {
                state: TerminalState::Success,
                iterations: 1,
                usage: None,
            },
        ];
        let frames: Vec<String> = sse_frames(events(input), SseOptions::minimal()).collect().await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("event: complete"));
    }

    #[tokio::test]
    async fn text_stream_yields_only_deltas() {
        let input = vec![
            ConductorEvent::Delta {
                content: "Hel".into(),
                iteration: 1,
            },
            ConductorEvent::Delta {
                content: "lo".into(),
                iteration: 1,
            },
            ConductorEvent::Complete {
                state: TerminalState::Success,
                iterations: 1,
                usage: None,
            },
        ];
        let text: Vec<String> = text_stream(events(input)).collect().await;
        assert_eq!(text.concat(), "Hello");
    }
}
