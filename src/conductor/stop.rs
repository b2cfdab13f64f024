//! Stop-Condition Evaluator
//!
//! Decides, after an assistant turn has finished streaming, whether the loop
//! ends or the turn's tool calls are executed. Rules are checked in order and
//! the first match wins:
//!
//! 1. the iteration count reached the safety cap: terminate, synthesizing a
//!    fallback answer when the turn has no content;
//! 2. no resolved tool calls: terminate;
//! 3. natural stop with a substantive answer: terminate, dropping any
//!    speculative tool calls that came with it;
//! 4. otherwise continue with tool execution.

use crate::defaults;
use crate::streaming::ResolvedToolCall;
use crate::types::FinishReason;

/// Everything the evaluator looks at.
#[derive(Debug, Clone, Copy)]
pub struct StopInput<'a> {
    pub content: &'a str,
    pub tool_calls: &'a [ResolvedToolCall],
    pub finish_reason: Option<&'a FinishReason>,
    pub iteration: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    SafetyLimit,
    NoToolCalls,
    SubstantiveAnswer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopDecision {
    /// End the loop with this final assistant content.
    Terminate { reason: StopReason, content: String },
    /// Execute every resolved tool call and run another iteration.
    Continue,
}

impl StopDecision {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminate { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub safety_iteration_cap: u32,
    pub substantive_answer_chars: usize,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            safety_iteration_cap: defaults::limits::SAFETY_ITERATION_CAP,
            substantive_answer_chars: defaults::limits::SUBSTANTIVE_ANSWER_CHARS,
        }
    }
}

impl StopPolicy {
    pub fn evaluate(&self, input: &StopInput<'_>) -> StopDecision {
        if input.iteration >= self.safety_iteration_cap {
            let content = if input.content.trim().is_empty() {
                defaults::SAFETY_LIMIT_FALLBACK_MESSAGE.to_string()
            } else {
                input.content.to_string()
            };
            return StopDecision::Terminate {
                reason: StopReason::SafetyLimit,
                content,
            };
        }

        if input.tool_calls.is_empty() {
            return StopDecision::Terminate {
                reason: StopReason::NoToolCalls,
                content: input.content.to_string(),
            };
        }

        let natural_stop = input.finish_reason.is_some_and(FinishReason::is_natural_stop);
        if natural_stop && input.content.chars().count() > self.substantive_answer_chars {
            return StopDecision::Terminate {
                reason: StopReason::SubstantiveAnswer,
                content: input.content.to_string(),
            };
        }

        StopDecision::Continue
    }
}
