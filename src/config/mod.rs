//! Configuration: provider pool entries and conductor options.

pub mod options;
pub mod provider;

pub use options::ConductorOptions;
pub use provider::{
    ComplexityHint, ProviderConfig, ProviderType, pool_from_json, validate_pool,
};
