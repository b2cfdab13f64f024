//! Name-based tool dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ProgressReporter, ToolExecutor, ToolInvocation};
use crate::error::ToolExecutionError;
use crate::types::Tool;

/// One tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Definition advertised to the model.
    fn definition(&self) -> Tool;

    async fn call(
        &self,
        invocation: &ToolInvocation,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<String, ToolExecutionError>;
}

/// Executor that routes calls to registered handlers by tool name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under the name of its definition, replacing any
    /// handler registered under the same name.
    pub fn register(mut self, handler: impl ToolHandler + 'static) -> Self {
        let name = handler.definition().function.name;
        if self.handlers.insert(name.clone(), Arc::new(handler)).is_none() {
            self.order.push(name);
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Definitions of every registered tool, in registration order.
    pub fn definitions(&self) -> Vec<Tool> {
        self.order
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|h| h.definition())
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.order).finish()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(
        &self,
        invocation: ToolInvocation,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<String, ToolExecutionError> {
        let Some(handler) = self.handlers.get(&invocation.tool_name) else {
            return Err(invocation.unknown_tool());
        };
        handler.call(&invocation, &progress, &cancel).await
    }
}
