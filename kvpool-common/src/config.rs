//! # Pool Configuration
//!
//! Purpose: Describe one shard pool: where it dials, how long each dial and
//! each socket operation may take, and how many connections it may hold.
//!
//! ## Notes
//! - Durations are (de)serialized as integer milliseconds so configuration
//!   files stay readable.
//! - Missing fields fall back to `PoolConfig::default()`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

/// Default delay before the first dial retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(10);

/// Upper bound on the delay between dial retries.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Configuration for a single shard pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Shard address, e.g. "127.0.0.1:6379".
    pub address: String,
    /// Per-dial timeout. Also bounds a whole `acquire` call.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Socket read timeout applied to every connection.
    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,
    /// Socket write timeout applied to every connection.
    #[serde(with = "duration_ms")]
    pub write_timeout: Duration,
    /// Maximum connections checked out or being dialed at once.
    pub max_connections: usize,
    /// Delay before the first dial retry.
    #[serde(with = "duration_ms")]
    pub initial_backoff: Duration,
    /// Cap on the delay between dial retries.
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            address: "127.0.0.1:6379".to_string(),
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
            max_connections: 16,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl PoolConfig {
    /// Builds a configuration with the given endpoint, timeouts and capacity,
    /// keeping the default backoff schedule.
    pub fn new(
        address: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
        write_timeout: Duration,
        max_connections: usize,
    ) -> Self {
        PoolConfig {
            address: address.into(),
            connect_timeout,
            read_timeout,
            write_timeout,
            max_connections,
            ..PoolConfig::default()
        }
    }

    /// Parses a JSON document, filling absent fields from the defaults.
    pub fn from_json(raw: &str) -> PoolResult<Self> {
        let config: PoolConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the pool cannot honor.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_connections == 0 {
            return Err(PoolError::InvalidConfig("max_connections must be at least 1"));
        }
        if self.connect_timeout.is_zero() {
            return Err(PoolError::InvalidConfig("connect_timeout must be non-zero"));
        }
        if self.address.is_empty() {
            return Err(PoolError::InvalidConfig("address must not be empty"));
        }
        if self.initial_backoff.is_zero() {
            return Err(PoolError::InvalidConfig("initial_backoff must be non-zero"));
        }
        if self.max_backoff.is_zero() {
            return Err(PoolError::InvalidConfig("max_backoff must be non-zero"));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
