//! Decoded provider stream types

use std::pin::Pin;

use futures::Stream;

use super::chat::MessageRole;
use super::common::{FinishReason, Usage};
use crate::error::ConductorError;

/// A fragment of one tool call, as streamed by the provider.
///
/// The first fragment of a call usually carries `id` and `name`; later ones
/// carry only `index` and an `arguments` slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: Option<usize>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// One decoded delta record of an assistant turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    pub role: Option<MessageRole>,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallFragment>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

impl StreamDelta {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Default::default()
        }
    }

    pub fn tool_call(fragment: ToolCallFragment) -> Self {
        Self {
            tool_calls: vec![fragment],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.content.as_deref().is_none_or(str::is_empty)
            && self.tool_calls.is_empty()
            && self.finish_reason.is_none()
            && self.usage.is_none()
    }
}

/// Lazy, finite sequence of decoded deltas.
///
/// `Err(ConductorError::StreamParse)` items are recoverable and followed by
/// further deltas; `Err(ConductorError::Provider)` ends the stream.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, ConductorError>> + Send>>;
