//! Provider stream handling
//!
//! - [`decoder`]: SSE bytes to [`StreamDelta`](crate::types::StreamDelta)s
//! - [`accumulator`]: tool-call fragments to complete, parsed tool calls

pub mod accumulator;
pub mod decoder;

pub use accumulator::{ResolvedToolCall, ToolCallAccumulator};
pub use decoder::{ChatChunkConverter, DONE_SENTINEL, SseEventConverter, decode_sse};
