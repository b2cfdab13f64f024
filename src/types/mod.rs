//! Core data types shared by the conductor components.

pub mod chat;
pub mod common;
pub mod events;
pub mod streaming;
pub mod tools;

pub use chat::*;
pub use common::*;
pub use events::*;
pub use streaming::*;
pub use tools::*;
