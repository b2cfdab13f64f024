//! Provider Selector
//!
//! Orders the provider pool (free tier first, then ascending priority) and
//! hands out the next usable provider. A provider that fails is excluded for
//! the rest of the request; the exclusion is never persisted.

use std::collections::HashSet;

use crate::config::{ComplexityHint, ProviderConfig};
use crate::defaults;
use crate::error::{ConductorError, ProviderError, ProviderFailure};
use crate::providers::ProviderTarget;
use crate::types::{ChatMessage, MessageRole, Tool};

/// Derive a complexity hint from the request shape.
///
/// Tool-enabled requests, long conversations and large inputs are heavy.
pub fn derive_complexity(messages: &[ChatMessage], tools: &[Tool]) -> ComplexityHint {
    let turns = messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .count();
    let chars: usize = messages.iter().map(|m| m.text().chars().count()).sum();

    if !tools.is_empty()
        || turns > defaults::complexity::HEAVY_MESSAGE_COUNT
        || chars > defaults::complexity::HEAVY_CONTENT_CHARS
    {
        ComplexityHint::Heavy
    } else {
        ComplexityHint::Light
    }
}

/// Per-request provider selection state.
#[derive(Debug)]
pub struct ProviderSelector {
    ordered: Vec<ProviderConfig>,
    hint: ComplexityHint,
    excluded: HashSet<String>,
    attempts: Vec<ProviderFailure>,
}

impl ProviderSelector {
    pub fn new(pool: &[ProviderConfig], hint: ComplexityHint) -> Self {
        let mut ordered = pool.to_vec();
        // Stable: equal keys keep pool order.
        ordered.sort_by_key(|p| (!p.is_free_tier(), p.priority));
        Self {
            ordered,
            hint,
            excluded: HashSet::new(),
            attempts: Vec::new(),
        }
    }

    pub fn hint(&self) -> ComplexityHint {
        self.hint
    }

    /// Providers in selection order.
    pub fn order(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.ordered.iter()
    }

    /// Failures recorded so far, in attempt order.
    pub fn attempts(&self) -> &[ProviderFailure] {
        &self.attempts
    }

    pub fn is_excluded(&self, provider_id: &str) -> bool {
        self.excluded.contains(provider_id)
    }

    /// The first provider not yet excluded, with its resolved model.
    ///
    /// Selection is sticky: while a provider keeps succeeding it is returned
    /// again for the next iteration.
    pub fn select(&mut self) -> Result<ProviderTarget, ConductorError> {
        loop {
            let Some(config) = self
                .ordered
                .iter()
                .find(|p| !self.excluded.contains(&p.id))
            else {
                return Err(self.exhausted());
            };

            match config.resolve_model(self.hint) {
                Some(model) => return Ok(ProviderTarget::new(config.clone(), model)),
                None => {
                    let failure = ProviderFailure {
                        provider_id: config.id.clone(),
                        provider_type: config.provider_type,
                        model: String::new(),
                        kind: crate::error::ProviderFailureKind::Other,
                        status: None,
                        reason: "no model configured".to_string(),
                    };
                    tracing::warn!(provider = %config.id, "skipping provider without a model");
                    self.excluded.insert(config.id.clone());
                    self.attempts.push(failure);
                }
            }
        }
    }

    /// Record a failed attempt and exclude the provider for this request.
    pub fn mark_failed(&mut self, target: &ProviderTarget, error: &ProviderError) {
        tracing::warn!(
            provider = %target.config.id,
            model = %target.model,
            kind = %error.kind,
            status = ?error.status,
            "provider failed; excluding for the rest of the request"
        );
        self.excluded.insert(target.config.id.clone());
        self.attempts.push(ProviderFailure {
            provider_id: target.config.id.clone(),
            provider_type: target.config.provider_type,
            model: target.model.clone(),
            kind: error.kind,
            status: error.status,
            reason: error.message.clone(),
        });
    }

    /// Aggregated error listing every attempt.
    pub fn exhausted(&self) -> ConductorError {
        ConductorError::NoProviderAvailable {
            attempts: self.attempts.clone(),
        }
    }
}
