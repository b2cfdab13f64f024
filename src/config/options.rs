//! Conductor runtime options
//!
//! Limits and timeouts for one conductor. Options are built with `with_*`
//! methods on top of `Default`, or loaded from `CONDUCTOR_*` environment
//! variables.

use std::str::FromStr;
use std::time::Duration;

use crate::defaults;
use crate::error::ConductorError;

pub const ENV_SAFETY_ITERATION_CAP: &str = "CONDUCTOR_SAFETY_ITERATION_CAP";
pub const ENV_HARD_MAX_ITERATIONS: &str = "CONDUCTOR_HARD_MAX_ITERATIONS";
pub const ENV_SUBSTANTIVE_ANSWER_CHARS: &str = "CONDUCTOR_SUBSTANTIVE_ANSWER_CHARS";
pub const ENV_MAX_CONCURRENT_TOOLS: &str = "CONDUCTOR_MAX_CONCURRENT_TOOLS";
pub const ENV_TOOL_TIMEOUT_SECS: &str = "CONDUCTOR_TOOL_TIMEOUT_SECS";
pub const ENV_STREAM_IDLE_TIMEOUT_SECS: &str = "CONDUCTOR_STREAM_IDLE_TIMEOUT_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "CONDUCTOR_REQUEST_TIMEOUT_SECS";
pub const ENV_VALIDATE_TOOL_ARGUMENTS: &str = "CONDUCTOR_VALIDATE_TOOL_ARGUMENTS";

/// Options controlling one conductor.
#[derive(Debug, Clone, PartialEq)]
pub struct ConductorOptions {
    /// Iteration count at which the loop always terminates.
    pub safety_iteration_cap: u32,
    /// Absolute ceiling on provider requests, failed attempts included.
    pub hard_max_iterations: u32,
    /// Natural-stop content longer than this ends the loop.
    pub substantive_answer_chars: usize,
    pub max_concurrent_tools: usize,
    pub tool_timeout: Duration,
    pub stream_idle_timeout: Duration,
    pub request_timeout: Duration,
    /// Validate parsed tool arguments against the declared JSON schema.
    pub validate_tool_arguments: bool,
    pub event_channel_capacity: usize,
}

impl Default for ConductorOptions {
    fn default() -> Self {
        Self {
            safety_iteration_cap: defaults::limits::SAFETY_ITERATION_CAP,
            hard_max_iterations: defaults::limits::HARD_MAX_ITERATIONS,
            substantive_answer_chars: defaults::limits::SUBSTANTIVE_ANSWER_CHARS,
            max_concurrent_tools: defaults::limits::MAX_CONCURRENT_TOOLS,
            tool_timeout: defaults::timeouts::TOOL_EXECUTION,
            stream_idle_timeout: defaults::timeouts::STREAM_IDLE,
            request_timeout: defaults::timeouts::REQUEST,
            validate_tool_arguments: true,
            event_channel_capacity: defaults::limits::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl ConductorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_safety_iteration_cap(mut self, cap: u32) -> Self {
        self.safety_iteration_cap = cap;
        self
    }

    pub const fn with_hard_max_iterations(mut self, max: u32) -> Self {
        self.hard_max_iterations = max;
        self
    }

    pub const fn with_substantive_answer_chars(mut self, chars: usize) -> Self {
        self.substantive_answer_chars = chars;
        self
    }

    pub const fn with_max_concurrent_tools(mut self, max: usize) -> Self {
        self.max_concurrent_tools = max;
        self
    }

    pub const fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub const fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub const fn with_tool_argument_validation(mut self, enabled: bool) -> Self {
        self.validate_tool_arguments = enabled;
        self
    }

    /// Load options from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConductorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load options through an arbitrary key lookup (environment, config map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConductorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();
        if let Some(v) = parse_var(&lookup, ENV_SAFETY_ITERATION_CAP)? {
            opts.safety_iteration_cap = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_HARD_MAX_ITERATIONS)? {
            opts.hard_max_iterations = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_SUBSTANTIVE_ANSWER_CHARS)? {
            opts.substantive_answer_chars = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_CONCURRENT_TOOLS)? {
            opts.max_concurrent_tools = v;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_TOOL_TIMEOUT_SECS)? {
            opts.tool_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_STREAM_IDLE_TIMEOUT_SECS)? {
            opts.stream_idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_REQUEST_TIMEOUT_SECS)? {
            opts.request_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var(&lookup, ENV_VALIDATE_TOOL_ARGUMENTS)? {
            opts.validate_tool_arguments = v;
        }
        opts.validate()?;
        Ok(opts)
    }

    /// Reject option combinations that cannot bound a request.
    pub fn validate(&self) -> Result<(), ConductorError> {
        if self.safety_iteration_cap == 0 {
            return Err(ConductorError::Configuration(
                "safety_iteration_cap must be at least 1".into(),
            ));
        }
        if self.hard_max_iterations < self.safety_iteration_cap {
            return Err(ConductorError::Configuration(format!(
                "hard_max_iterations ({}) must not be below safety_iteration_cap ({})",
                self.hard_max_iterations, self.safety_iteration_cap
            )));
        }
        if self.max_concurrent_tools == 0 || self.event_channel_capacity == 0 {
            return Err(ConductorError::Configuration(
                "concurrency and channel capacity must be positive".into(),
            ));
        }
        if self.tool_timeout.is_zero()
            || self.stream_idle_timeout.is_zero()
            || self.request_timeout.is_zero()
        {
            return Err(ConductorError::Configuration(
                "timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConductorError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConductorError::Configuration(format!("{key}={raw:?}: {e}"))),
    }
}
