//! Tool-Call Accumulator
//!
//! Assembles streamed tool-call fragments into complete calls. Argument
//! fragments are appended in arrival order; parsing happens once, when the
//! turn completes.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::ToolArgumentsError;
use crate::types::{ToolCall, ToolCallFragment};

#[derive(Debug, Default, Clone)]
struct ToolCallBuilder {
    id: Option<String>,
    name: String,
    args_json: String,
}

/// A tool call at the end of a turn, with its parsed arguments or the reason
/// they could not be used.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedToolCall {
    pub call: ToolCall,
    pub arguments: Result<Value, ToolArgumentsError>,
}

impl ResolvedToolCall {
    pub fn id(&self) -> &str {
        &self.call.id
    }

    pub fn name(&self) -> &str {
        self.call.name()
    }

    pub fn is_valid(&self) -> bool {
        self.arguments.is_ok()
    }

    /// Mark the arguments invalid (e.g. after a schema check).
    pub fn reject(&mut self, reason: impl Into<String>) {
        self.arguments = Err(ToolArgumentsError {
            tool_call_id: self.call.id.clone(),
            tool_name: self.call.function.name.clone(),
            reason: reason.into(),
        });
    }
}

/// Per-turn tool-call builder map.
///
/// Builders are kept in the order their first fragment arrived. A builder is
/// open until a fragment with a different id arrives at its index (or, for
/// index-less providers, until any new id arrives).
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    builders: Vec<ToolCallBuilder>,
    by_index: HashMap<usize, usize>,
    last_open: Option<usize>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn push(&mut self, fragment: &ToolCallFragment) {
        let pos = self.route(fragment);
        let builder = &mut self.builders[pos];
        if builder.id.is_none() {
            builder.id = fragment.id.clone();
        }
        if let Some(name) = fragment.name.as_deref()
            && builder.name.is_empty()
        {
            builder.name = name.to_string();
        }
        if let Some(args) = fragment.arguments.as_deref() {
            builder.args_json.push_str(args);
        }
    }

    pub fn extend<'a>(&mut self, fragments: impl IntoIterator<Item = &'a ToolCallFragment>) {
        for fragment in fragments {
            self.push(fragment);
        }
    }

    /// Position of the builder this fragment belongs to, opening one if needed.
    fn route(&mut self, fragment: &ToolCallFragment) -> usize {
        let current = match fragment.index {
            Some(index) => self.by_index.get(&index).copied(),
            None => match fragment.id.as_deref() {
                Some(id) => self
                    .builders
                    .iter()
                    .position(|b| b.id.as_deref() == Some(id))
                    .or(self.last_open),
                None => self.last_open,
            },
        };

        let continues = current.is_some_and(|pos| {
            match (self.builders[pos].id.as_deref(), fragment.id.as_deref()) {
                (Some(open), Some(new)) => open == new,
                _ => true,
            }
        });

        let pos = match current {
            Some(pos) if continues => pos,
            _ => {
                self.builders.push(ToolCallBuilder::default());
                self.builders.len() - 1
            }
        };
        if let Some(index) = fragment.index {
            self.by_index.insert(index, pos);
        }
        self.last_open = Some(pos);
        pos
    }

    /// Seal every builder and parse its arguments.
    ///
    /// Each call is resolved independently: a call with a missing name or
    /// unparsable arguments fails alone.
    pub fn finish(self) -> Vec<ResolvedToolCall> {
        let mut seen = HashSet::new();
        self.builders
            .into_iter()
            .map(|builder| {
                let id = match builder.id {
                    Some(id) if seen.insert(id.clone()) => id,
                    Some(duplicate) => {
                        let id = generated_id();
                        tracing::warn!(
                            duplicate = %duplicate,
                            assigned = %id,
                            "tool call id reused within one turn"
                        );
                        id
                    }
                    None => generated_id(),
                };
                let raw = builder.args_json.trim();
                let args_json = (if raw.is_empty() { "{}" } else { raw }).to_string();
                let arguments = parse_arguments(&id, &builder.name, &args_json);
                ResolvedToolCall {
                    call: ToolCall::new(id, builder.name, args_json),
                    arguments,
                }
            })
            .collect()
    }
}

fn generated_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

fn parse_arguments(id: &str, name: &str, args_json: &str) -> Result<Value, ToolArgumentsError> {
    let fail = |reason: String| ToolArgumentsError {
        tool_call_id: id.to_string(),
        tool_name: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(fail("tool call has no function name".to_string()));
    }
    match serde_json::from_str::<Value>(args_json) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(fail(format!(
            "arguments must be a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(fail(format!("arguments are not valid JSON: {e}"))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
