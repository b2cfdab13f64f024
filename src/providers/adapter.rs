//! Provider Adapter
//!
//! Per-family differences of OpenAI-compatible chat-completions endpoints:
//! URL derivation, headers, request body tweaks and finish-reason sentinels.
//! Dispatch is a plain enum match; every family shares the same wire shape.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::config::{ProviderConfig, ProviderType};
use crate::defaults;
use crate::error::ConductorError;
use crate::types::{ChatMessage, FinishReason, Tool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderAdapter {
    OpenAi,
    Groq,
    Gemini,
    Together,
    /// Any other OpenAI-compatible endpoint.
    Custom,
}

impl ProviderAdapter {
    pub fn for_type(provider_type: ProviderType) -> Self {
        match provider_type {
            ProviderType::FreeTierGroq | ProviderType::Groq => Self::Groq,
            ProviderType::OpenAi => Self::OpenAi,
            ProviderType::FreeTierGemini | ProviderType::Gemini => Self::Gemini,
            ProviderType::Together => Self::Together,
            ProviderType::Custom => Self::Custom,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Groq => "groq",
            Self::Gemini => "gemini",
            Self::Together => "together",
            Self::Custom => "openai-compatible",
        }
    }

    /// Whether the family honours `stream_options.include_usage`.
    pub fn supports_stream_usage(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Together)
    }

    /// Full chat-completions URL for a provider.
    pub fn chat_url(&self, config: &ProviderConfig) -> Result<String, ConductorError> {
        let base = config.base_url().ok_or_else(|| {
            ConductorError::Configuration(format!(
                "provider `{}` has no API endpoint",
                config.id
            ))
        })?;
        Ok(format!("{base}{}", defaults::http::CHAT_COMPLETIONS_PATH))
    }

    pub fn headers(&self, config: &ProviderConfig) -> Result<HeaderMap, ConductorError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!(
            "Bearer {}",
            config.api_key.expose_secret()
        ))
        .map_err(|_| {
            ConductorError::Configuration(format!(
                "provider `{}` has an API key that is not a valid header value",
                config.id
            ))
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(USER_AGENT, HeaderValue::from_static(defaults::http::USER_AGENT));
        Ok(headers)
    }

    /// Streaming request body for one turn.
    pub fn build_body(&self, model: &str, messages: &[ChatMessage], tools: &[Tool]) -> Value {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }
        if self.supports_stream_usage() {
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }

    /// Map a raw provider finish reason onto the normalized enum.
    pub fn finish_reason(&self, raw: &str) -> FinishReason {
        match raw {
            "stop" | "STOP" | "end_turn" | "stop_sequence" => FinishReason::Stop,
            "tool_calls" | "function_call" | "tool_use" => FinishReason::ToolCalls,
            "length" | "MAX_TOKENS" | "max_tokens" => FinishReason::Length,
            "content_filter" | "SAFETY" | "RECITATION" => FinishReason::ContentFilter,
            // Together's native models end with `eos`.
            "eos" if matches!(self, Self::Together | Self::Custom) => FinishReason::Stop,
            "" => FinishReason::Unknown,
            other => FinishReason::Other(other.to_string()),
        }
    }
}
