// Axum chat proxy running the conductor over SSE
// Run: CONDUCTOR_PROVIDERS='[{"id":"groq","type":"free-tier-groq","apiKey":"gsk_..."}]' \
//      cargo run --example axum_proxy --features server-adapters
// Then: curl -N localhost:8080/chat -H 'content-type: application/json' \
//      -d '{"messages":[{"role":"user","content":"What time is it in UTC?"}]}'

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use tool_conductor::config::validate_pool;
use tool_conductor::observability::{SubscriberConfig, init_subscriber};
use tool_conductor::prelude::*;
use tool_conductor::server_adapters::SseOptions;
use tool_conductor::server_adapters::axum::to_sse_response;

/// Demo tool: current time in UTC, optionally formatted.
struct CurrentTime;

#[async_trait]
impl ToolHandler for CurrentTime {
    fn definition(&self) -> Tool {
        Tool::function(
            "current_time",
            "Current date and time in UTC",
            json!({
                "type": "object",
                "properties": {
                    "format": {"type": "string", "description": "strftime pattern, RFC 3339 when omitted"}
                }
            }),
        )
    }

    async fn call(
        &self,
        invocation: &ToolInvocation,
        progress: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> Result<String, ToolExecutionError> {
        progress.report("reading_clock", json!({})).await;
        let now = chrono::Utc::now();
        let formatted = match invocation.arguments["format"].as_str() {
            Some(pattern) => now.format(pattern).to_string(),
            None => now.to_rfc3339(),
        };
        Ok(json!({ "utc": formatted }).to_string())
    }
}

struct AppState {
    conductor: Conductor,
    tools: Vec<Tool>,
    providers: Vec<ProviderConfig>,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    messages: Vec<ChatMessage>,
    /// Per-request pool; the server pool is used when absent.
    #[serde(default)]
    providers: Option<Vec<ProviderConfig>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = init_subscriber(SubscriberConfig::from_env()?)?;

    let providers = match std::env::var("CONDUCTOR_PROVIDERS") {
        Ok(raw) => pool_from_json(&raw)?,
        Err(_) => {
            eprintln!("CONDUCTOR_PROVIDERS is not set; requests must carry their own providers");
            Vec::new()
        }
    };

    let registry = ToolRegistry::new().register(CurrentTime);
    let tools = registry.definitions();
    let conductor = Conductor::http(Arc::new(registry), ConductorOptions::from_env()?)?;
    let state = Arc::new(AppState {
        conductor,
        tools,
        providers,
    });

    let app = Router::new()
        .route("/chat", post(chat_handler))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 8080));
    println!("Listening on http://{addr}/chat");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    let providers = body.providers.unwrap_or_else(|| state.providers.clone());

    let events: EventStream = match validate_pool(&providers) {
        Ok(()) => {
            let request = ConductorRequest::new(body.messages, providers).with_tools(state.tools.clone());
            state.conductor.stream(request)
        }
        Err(e) => {
            let event = ConductorEvent::Error {
                kind: e.kind().to_string(),
                message: e.to_string(),
                attempts: Vec::new(),
            };
            Box::pin(futures::stream::once(async move { event }))
        }
    };

    to_sse_response(events, SseOptions::development())
}
