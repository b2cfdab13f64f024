//! Tool argument validation against declared JSON schemas.

use serde_json::Value;

use crate::streaming::ResolvedToolCall;
use crate::types::Tool;

const MAX_REPORTED_ERRORS: usize = 3;

/// Validate an argument object against a tool's parameter schema.
///
/// Non-object schemas are not checked; an uncompilable schema is reported as
/// a validation failure of the call.
pub fn validate_arguments(schema: &Value, instance: &Value) -> Result<(), String> {
    if !schema.is_object() {
        return Ok(());
    }

    let validator = jsonschema::validator_for(schema)
        .map_err(|e| format!("tool schema is invalid: {e}"))?;

    let messages: Vec<String> = validator
        .iter_errors(instance)
        .take(MAX_REPORTED_ERRORS)
        .map(|err| {
            let path = err.instance_path.to_string();
            if path.is_empty() {
                err.to_string()
            } else {
                format!("{err} at {path}")
            }
        })
        .collect();

    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages.join("; "))
    }
}

/// Check every parsed call against the tool it names. Calls to undeclared
/// tools are left for the executor to reject.
pub fn validate_calls(calls: &mut [ResolvedToolCall], tools: &[Tool]) {
    for call in calls.iter_mut() {
        let Ok(arguments) = &call.arguments else {
            continue;
        };
        let Some(tool) = tools.iter().find(|t| t.name() == call.name()) else {
            continue;
        };
        if let Err(reason) = validate_arguments(&tool.function.parameters, arguments) {
            tracing::debug!(
                tool_call_id = %call.call.id,
                tool = %call.call.function.name,
                %reason,
                "tool arguments violate schema"
            );
            call.reject(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;
    use serde_json::json;

    fn search_tool() -> Tool {
        Tool::function(
            "search_web",
            "Search the web",
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        )
    }

    #[test]
    fn accepts_matching_arguments() {
        let tool = search_tool();
        assert!(validate_arguments(&tool.function.parameters, &json!({"query": "rust"})).is_ok());
    }

    #[test]
    fn reports_missing_required_property() {
        let tool = search_tool();
        let err = validate_arguments(&tool.function.parameters, &json!({})).unwrap_err();
        assert!(err.contains("query"), "{err}");
    }

    #[test]
    fn rejects_only_the_violating_call() {
        let mut calls = vec![
            ResolvedToolCall {
                call: ToolCall::new("a", "search_web", r#"{"query":"x"}"#),
                arguments: Ok(json!({"query": "x"})),
            },
            ResolvedToolCall {
                call: ToolCall::new("b", "search_web", r#"{"query":1}"#),
                arguments: Ok(json!({"query": 1})),
            },
            ResolvedToolCall {
                call: ToolCall::new("c", "undeclared", "{}"),
                arguments: Ok(json!({})),
            },
        ];
        validate_calls(&mut calls, &[search_tool()]);
        assert!(calls[0].is_valid());
        assert!(!calls[1].is_valid());
        assert!(calls[2].is_valid());
    }
}
