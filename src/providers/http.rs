//! reqwest-backed transport

use std::sync::Arc;

use async_trait::async_trait;

use super::{ChatRequest, ChatTransport, ProviderTarget};
use crate::defaults;
use crate::error::{ConductorError, ProviderError, ProviderFailureKind};
use crate::streaming::{ChatChunkConverter, decode_sse};
use crate::types::DeltaStream;

/// Streams chat completions over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ConductorError> {
        let client = reqwest::Client::builder()
            .connect_timeout(defaults::timeouts::CONNECT)
            .user_agent(defaults::http::USER_AGENT)
            .build()
            .map_err(|e| ConductorError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (proxies, custom TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn classify_send_error(provider_id: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(provider_id, format!("request timed out: {err}"))
    } else {
        ProviderError::network(provider_id, format!("request failed: {err}"))
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(
        &self,
        target: &ProviderTarget,
        request: &ChatRequest,
    ) -> Result<DeltaStream, ConductorError> {
        let provider_id = target.id();
        let adapter = target.adapter();

        // A broken entry fails over like any other provider failure.
        let misconfigured =
            |e: ConductorError| ProviderError::new(provider_id, ProviderFailureKind::Other, e.to_string());
        let url = adapter.chat_url(&target.config).map_err(misconfigured)?;
        let headers = adapter.headers(&target.config).map_err(misconfigured)?;
        let body = adapter.build_body(&target.model, &request.messages, &request.tools);

        tracing::debug!(
            provider = provider_id,
            adapter = adapter.name(),
            model = %target.model,
            url = %url,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "opening provider stream"
        );

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error(provider_id, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = ProviderError::from_status(provider_id, status.as_u16(), &text);
            tracing::warn!(
                provider = provider_id,
                status = status.as_u16(),
                kind = %err.kind,
                "provider rejected request"
            );
            return Err(err.into());
        }

        let converter = Arc::new(ChatChunkConverter::new(provider_id, adapter));
        Ok(decode_sse(response.bytes_stream(), converter))
    }
}
