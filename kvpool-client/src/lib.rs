//! # Shard Connection Pool
//!
//! Purpose: Provide a bounded, blocking connection pool for a single remote
//! key-value shard, with connect-retry under a deadline.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections to avoid repeated connects.
//! 2. **Hard Capacity**: Checked-out plus in-flight dials never exceed the limit.
//! 3. **Return What You Borrow**: Every `acquire` is paired with one `release`,
//!    even when the acquire failed.
//! 4. **Strategy Pattern**: The transport is a trait so tests run without sockets.

mod dial;
mod pool;
mod transport;

#[cfg(test)]
mod testing;

pub use dial::{Backoff, Dialer};
pub use kvpool_common::{PoolConfig, PoolError, PoolResult};
pub use pool::{Pool, PoolStats, PooledConnection};
pub use transport::{Connection, TcpConnection, TcpTransport, Timeouts, Transport};
