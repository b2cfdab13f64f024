//! Provider configuration
//!
//! The provider pool is resolved by the caller (caller-supplied credentials
//! merged with operator defaults) and handed to the conductor per request.

use std::collections::HashSet;
use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::defaults;
use crate::error::ConductorError;

/// Request complexity, used to pick a model variant when none is pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityHint {
    /// Short single-turn requests: smaller, faster model.
    Light,
    /// Multi-turn or tool-enabled requests: larger model.
    Heavy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "free-tier-groq")]
    FreeTierGroq,
    #[serde(rename = "groq")]
    Groq,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "free-tier-gemini")]
    FreeTierGemini,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "together")]
    Together,
    /// Any OpenAI-compatible endpoint; requires an explicit endpoint and model.
    #[serde(rename = "openai-compatible", alias = "custom")]
    Custom,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreeTierGroq => "free-tier-groq",
            Self::Groq => "groq",
            Self::OpenAi => "openai",
            Self::FreeTierGemini => "free-tier-gemini",
            Self::Gemini => "gemini",
            Self::Together => "together",
            Self::Custom => "openai-compatible",
        }
    }

    /// Types that are free tier by definition, regardless of the `freeTier` flag.
    pub fn is_free_tier_type(&self) -> bool {
        matches!(self, Self::FreeTierGroq | Self::FreeTierGemini)
    }

    /// Base URL derived from the type; `None` for custom endpoints.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::FreeTierGroq | Self::Groq => Some(defaults::endpoints::GROQ),
            Self::OpenAi => Some(defaults::endpoints::OPENAI),
            Self::FreeTierGemini | Self::Gemini => Some(defaults::endpoints::GEMINI),
            Self::Together => Some(defaults::endpoints::TOGETHER),
            Self::Custom => None,
        }
    }

    /// Default model for this type; `None` for custom endpoints.
    pub fn default_model(&self, hint: ComplexityHint) -> Option<&'static str> {
        let (heavy, light) = match self {
            Self::FreeTierGroq | Self::Groq => defaults::models::GROQ,
            Self::OpenAi => defaults::models::OPENAI,
            Self::FreeTierGemini => defaults::models::GEMINI_FREE,
            Self::Gemini => defaults::models::GEMINI,
            Self::Together => defaults::models::TOGETHER,
            Self::Custom => return None,
        };
        Some(match hint {
            ComplexityHint::Heavy => heavy,
            ComplexityHint::Light => light,
        })
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured LLM backend. Immutable for the lifetime of a request.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_provider_config"))]
pub struct ProviderConfig {
    #[validate(length(min = 1))]
    pub id: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(deserialize_with = "deserialize_secret")]
    pub api_key: SecretString,
    #[serde(default)]
    #[validate(url)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub model_override: Option<String>,
    #[serde(default)]
    pub free_tier: bool,
    /// Lower values are preferred.
    #[serde(default)]
    pub priority: i32,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn validate_provider_config(config: &ProviderConfig) -> Result<(), ValidationError> {
    if config.provider_type == ProviderType::Custom {
        if config.api_endpoint.as_deref().is_none_or(str::is_empty) {
            return Err(ValidationError::new("custom_requires_api_endpoint"));
        }
        if config.model_override.as_deref().is_none_or(str::is_empty) {
            return Err(ValidationError::new("custom_requires_model_override"));
        }
    }
    Ok(())
}

impl ProviderConfig {
    pub fn new(
        id: impl Into<String>,
        provider_type: ProviderType,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            provider_type,
            api_key: SecretString::from(api_key.into()),
            api_endpoint: None,
            model_override: None,
            free_tier: provider_type.is_free_tier_type(),
            priority: 0,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn with_free_tier(mut self, free_tier: bool) -> Self {
        self.free_tier = free_tier;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_free_tier(&self) -> bool {
        self.free_tier || self.provider_type.is_free_tier_type()
    }

    /// Base URL without trailing slash: explicit endpoint first, then the type default.
    pub fn base_url(&self) -> Option<String> {
        self.api_endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .or_else(|| self.provider_type.default_base_url())
            .map(|url| url.trim_end_matches('/').to_string())
    }

    /// Model for the next request: the override if pinned, else the type default.
    pub fn resolve_model(&self, hint: ComplexityHint) -> Option<String> {
        self.model_override
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| self.provider_type.default_model(hint).map(str::to_string))
    }

    /// Validate this entry, mapping failures to a configuration error.
    pub fn validate_config(&self) -> Result<(), ConductorError> {
        self.validate().map_err(|e| {
            ConductorError::Configuration(format!("provider `{}`: {e}", self.id))
        })
    }
}

/// Parse and validate a provider pool from its JSON representation.
pub fn pool_from_json(json: &str) -> Result<Vec<ProviderConfig>, ConductorError> {
    let pool: Vec<ProviderConfig> = serde_json::from_str(json)
        .map_err(|e| ConductorError::Configuration(format!("invalid provider pool: {e}")))?;
    validate_pool(&pool)?;
    Ok(pool)
}

/// Validate every entry and require unique ids.
pub fn validate_pool(pool: &[ProviderConfig]) -> Result<(), ConductorError> {
    let mut seen = HashSet::new();
    for config in pool {
        config.validate_config()?;
        if !seen.insert(config.id.as_str()) {
            return Err(ConductorError::Configuration(format!(
                "duplicate provider id `{}`",
                config.id
            )));
        }
    }
    Ok(())
}
