//! Error types shared by the pool, the dialer, and the transport.

use std::io;

/// Result alias used across the workspace.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by the shard connection pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No connection could be established before the acquire deadline.
    #[error("couldn't successfully dial an instance at {address}")]
    DialDeadline { address: String },

    /// Pool configuration was rejected at construction time.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(&'static str),

    /// Configuration document could not be parsed.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Address did not resolve to any socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Network or IO failure while dialing, reading, or writing.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The connection was closed before the operation.
    #[error("connection closed")]
    Closed,
}

impl PoolError {
    /// Returns true for the terminal error `acquire` reports when the
    /// deadline passes without a connection.
    pub fn is_dial_deadline(&self) -> bool {
        matches!(self, PoolError::DialDeadline { .. })
    }
}
