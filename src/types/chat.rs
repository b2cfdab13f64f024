//! Conversation message types

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::tools::ToolCall;
use crate::error::ConductorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message of the conversation, in the OpenAI chat-completions shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    /// Nullable for assistant turns that only carry tool calls.
    #[serde(default)]
    pub content: Option<String>,
    /// Present only on assistant messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Present only on tool messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name, present only on tool messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn with_role(role: MessageRole, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, Some(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, Some(content.into()))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, Some(content.into()))
    }

    /// Assistant turn carrying tool calls; empty content is stored as `null`.
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let content = content.into();
        let mut msg = Self::with_role(
            MessageRole::Assistant,
            (!content.is_empty()).then_some(content),
        );
        msg.tool_calls = tool_calls;
        msg
    }

    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(MessageRole::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg.name = Some(name.into());
        msg
    }

    /// Text content, empty when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Check the ordering invariants of a conversation.
///
/// `tool_calls` may only appear on assistant messages, and every tool message
/// must answer a call emitted by the assistant message that precedes the run
/// of tool messages it belongs to.
pub fn validate_conversation(messages: &[ChatMessage]) -> Result<(), ConductorError> {
    if messages.is_empty() {
        return Err(ConductorError::InvalidRequest(
            "conversation has no messages".to_string(),
        ));
    }
    let mut open_calls: Option<HashSet<&str>> = None;

    for (idx, msg) in messages.iter().enumerate() {
        if !msg.tool_calls.is_empty() && msg.role != MessageRole::Assistant {
            return Err(ConductorError::InvalidRequest(format!(
                "message {idx}: tool_calls are only allowed on assistant messages"
            )));
        }
        match msg.role {
            MessageRole::Assistant => {
                open_calls = Some(msg.tool_calls.iter().map(|c| c.id.as_str()).collect());
            }
            MessageRole::Tool => {
                let id = msg.tool_call_id.as_deref().ok_or_else(|| {
                    ConductorError::InvalidRequest(format!(
                        "message {idx}: tool message without tool_call_id"
                    ))
                })?;
                let answered = open_calls.as_ref().is_some_and(|ids| ids.contains(id));
                if !answered {
                    return Err(ConductorError::InvalidRequest(format!(
                        "message {idx}: tool_call_id `{id}` does not match the preceding assistant turn"
                    )));
                }
            }
            MessageRole::System | MessageRole::User => open_calls = None,
        }
    }
    Ok(())
}
