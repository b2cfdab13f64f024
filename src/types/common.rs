//! Common types: finish reasons and usage.

use serde::{Deserialize, Serialize};

/// Normalized reason why the model stopped generating.
///
/// Provider adapters map their raw strings onto this enum, so the stop
/// condition never inspects vendor sentinels directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural completion.
    ///
    /// Maps to:
    /// - OpenAI / Groq: `stop`
    /// - Gemini: `STOP`
    /// - Together: `eos`
    Stop,

    /// Maximum token budget reached (`length`, `MAX_TOKENS`).
    Length,

    /// The model wants tools executed (`tool_calls`, `function_call`).
    ToolCalls,

    /// Content was filtered (`content_filter`, `SAFETY`).
    ContentFilter,

    /// Other provider-specific reason.
    Other(String),

    Unknown,
}

impl FinishReason {
    pub fn is_natural_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }

    pub fn wants_tools(&self) -> bool {
        matches!(self, Self::ToolCalls)
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Accumulate another step's usage into this one.
    pub fn merge(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}
