//! Default Configuration Values
//!
//! This module centralizes the default values used by the conductor, the
//! provider adapters and the tool gateway, so they can be adjusted in one place.

use std::time::Duration;

/// Iteration and stop-condition defaults
pub mod limits {
    /// Iteration count at which the stop-condition evaluator always terminates.
    pub const SAFETY_ITERATION_CAP: u32 = 8;

    /// Absolute ceiling on provider requests (successful turns plus failed
    /// attempts) within one conversation request.
    pub const HARD_MAX_ITERATIONS: u32 = 16;

    /// Content length (in characters) above which a natural stop is treated as
    /// a complete answer even when tool calls accompany it.
    pub const SUBSTANTIVE_ANSWER_CHARS: usize = 200;

    /// Maximum number of sibling tool calls executed at the same time.
    pub const MAX_CONCURRENT_TOOLS: usize = 4;

    /// Capacity of the client event channel.
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;

    /// Capacity of a single tool's progress channel.
    pub const PROGRESS_CHANNEL_CAPACITY: usize = 32;
}

/// Timeout defaults
pub mod timeouts {
    use super::*;

    /// Upper bound for a single tool execution.
    pub const TOOL_EXECUTION: Duration = Duration::from_secs(60);

    /// Maximum silence on a provider stream before it is treated as failed.
    pub const STREAM_IDLE: Duration = Duration::from_secs(60);

    /// Upper bound for one whole conversation request.
    pub const REQUEST: Duration = Duration::from_secs(300);

    /// Timeout for establishing a provider connection.
    pub const CONNECT: Duration = Duration::from_secs(10);

    /// How long a cancelled tool or request may take to observe its
    /// cancellation token before it is dropped.
    pub const CANCEL_GRACE: Duration = Duration::from_secs(2);
}

/// HTTP client defaults
pub mod http {
    /// User-Agent sent to providers.
    pub const USER_AGENT: &str = concat!("tool-conductor/", env!("CARGO_PKG_VERSION"));

    /// Path appended to a provider base URL for chat completions.
    pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
}

/// Provider base URLs
pub mod endpoints {
    pub const GROQ: &str = "https://api.groq.com/openai/v1";
    pub const OPENAI: &str = "https://api.openai.com/v1";
    pub const GEMINI: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
    pub const TOGETHER: &str = "https://api.together.xyz/v1";
}

/// Default models per provider family, as (heavy, light) pairs.
///
/// Heavy variants serve tool-enabled or multi-turn requests, light variants
/// serve short single-turn requests.
pub mod models {
    pub const GROQ: (&str, &str) = ("llama-3.3-70b-versatile", "llama-3.1-8b-instant");
    pub const OPENAI: (&str, &str) = ("gpt-4o", "gpt-4o-mini");
    pub const GEMINI_FREE: (&str, &str) = ("gemini-2.0-flash", "gemini-2.0-flash-lite");
    pub const GEMINI: (&str, &str) = ("gemini-2.5-pro", "gemini-2.5-flash");
    pub const TOGETHER: (&str, &str) = (
        "meta-llama/Llama-3.3-70B-Instruct-Turbo",
        "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo",
    );
}

/// Thresholds used to derive a complexity hint when the caller supplies none.
pub mod complexity {
    /// Conversations with more non-system messages than this are heavy.
    pub const HEAVY_MESSAGE_COUNT: usize = 4;

    /// Conversations with more content characters than this are heavy.
    pub const HEAVY_CONTENT_CHARS: usize = 4_000;
}

/// Message used when the safety limit ends a turn that produced no content.
pub const SAFETY_LIMIT_FALLBACK_MESSAGE: &str = "I reached the maximum number of tool-calling steps for this request. \
     The tool results above contain the information gathered so far and constitute my answer.";
