//! Utility modules for tool-conductor

pub mod cancel;

pub use cancel::{CancelHandle, new_cancel_handle};
