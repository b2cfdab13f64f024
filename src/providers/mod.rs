//! Provider access
//!
//! [`ChatTransport`] is the seam between the conductor and the network: it
//! opens one streaming chat completion against a selected provider and hands
//! back decoded deltas. [`HttpTransport`] is the reqwest implementation; tests
//! substitute scripted transports.

pub mod adapter;
pub mod http;

use async_trait::async_trait;

pub use adapter::ProviderAdapter;
pub use http::HttpTransport;

use crate::config::ProviderConfig;
use crate::error::ConductorError;
use crate::types::{ChatMessage, DeltaStream, Tool};

/// A provider chosen for one attempt, with its resolved model.
#[derive(Debug, Clone)]
pub struct ProviderTarget {
    pub config: ProviderConfig,
    pub model: String,
}

impl ProviderTarget {
    pub fn new(config: ProviderConfig, model: impl Into<String>) -> Self {
        Self {
            config,
            model: model.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn adapter(&self) -> ProviderAdapter {
        ProviderAdapter::for_type(self.config.provider_type)
    }
}

/// Payload of one streaming completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Tool>,
}

/// Opens streaming chat completions.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Start a streaming completion.
    ///
    /// Errors returned here (connection refused, non-2xx status) are
    /// `ConductorError::Provider` and trigger failover.
    async fn open_stream(
        &self,
        target: &ProviderTarget,
        request: &ChatRequest,
    ) -> Result<DeltaStream, ConductorError>;
}
