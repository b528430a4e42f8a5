// kvpool-common - Shared error and configuration types for the shard pool
//
// This crate defines what the pool and its callers agree on: the error
// taxonomy and the per-shard pool configuration.

pub mod config;
pub mod error;

// Re-export for convenience
pub use config::*;
pub use error::*;
