//! Error Handling Module
//!
//! This module provides the error taxonomy of the conductor:
//! - Recoverable conditions (`StreamParseError`, `ToolArgumentsError`,
//!   `ToolExecutionError`, `ProviderError`) that are absorbed into the
//!   conversation or trigger failover
//! - Terminal conditions (`NoProviderAvailable`, cancellation, timeouts and
//!   unrecoverable transport failures)
//! - Helpers for rendering per-provider failure detail
//!
//! # Example
//!
//! ```rust
//! use tool_conductor::error::{ConductorError, ErrorCategory, ProviderError};
//!
//! let err: ConductorError = ProviderError::from_status("groq", 429, "slow down").into();
//! assert_eq!(err.category(), ErrorCategory::Provider);
//! assert!(!err.is_fatal());
//! ```

pub mod helpers;
pub mod types;

pub use helpers::*;
pub use types::*;
