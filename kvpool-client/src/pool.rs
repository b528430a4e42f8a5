//! # Connection Pool
//!
//! Purpose: Share a bounded set of connections to one shard among many
//! threads, reusing idle connections and dialing new ones on demand.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep idle connections for reuse, FIFO order.
//! 2. **Reserve Before Dial**: A dial slot is charged before the lock is
//!    dropped, so concurrent acquirers can never over-subscribe the pool.
//! 3. **Minimal Locking**: Dials and closes happen outside the mutex.
//! 4. **Monitor Wait**: Callers blocked on capacity park on a condvar and are
//!    woken one at a time as slots free up.
//!
//! ## Accounting
//!
//! `outstanding` counts connections held by callers or being dialed. Idle
//! connections are not counted; a connection moves into `outstanding` only
//! when it is handed out.
//!
//! ## Limitations
//! - Waiting for capacity has no timeout. The acquire deadline only bounds
//!   dialing, and waiters are woken in no particular order.
//! - `shutdown` closes idle connections only. Checked-out connections are
//!   closed when their holders release or drop them.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use kvpool_common::{PoolConfig, PoolResult};

use crate::dial::Dialer;
use crate::transport::{Connection, TcpTransport, Transport};

struct PoolState<C> {
    idle: VecDeque<C>,
    outstanding: usize,
}

struct PoolInner<T: Transport> {
    dialer: Dialer<T>,
    connect_timeout: Duration,
    max_connections: usize,
    state: Mutex<PoolState<T::Conn>>,
    available: Condvar,
}

/// Point-in-time view of the pool's accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections parked in the idle set.
    pub idle: usize,
    /// Connections checked out or being dialed.
    pub outstanding: usize,
    /// Capacity limit.
    pub max_connections: usize,
}

/// Connection pool handle for a single shard address.
///
/// Cloning the handle shares the same pool.
pub struct Pool<T: Transport = TcpTransport> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Transport> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Pool {
            inner: self.inner.clone(),
        }
    }
}

impl Pool<TcpTransport> {
    /// Creates a TCP pool for `address`.
    pub fn new(
        address: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
        write_timeout: Duration,
        max_connections: usize,
    ) -> PoolResult<Self> {
        Self::with_config(PoolConfig::new(
            address,
            connect_timeout,
            read_timeout,
            write_timeout,
            max_connections,
        ))
    }

    /// Creates a TCP pool from a full configuration.
    pub fn with_config(config: PoolConfig) -> PoolResult<Self> {
        Self::with_transport(config, TcpTransport)
    }
}

impl<T: Transport> Pool<T> {
    /// Creates a pool that opens connections through `transport`.
    pub fn with_transport(config: PoolConfig, transport: T) -> PoolResult<Self> {
        config.validate()?;
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_connections),
            outstanding: 0,
        };
        Ok(Pool {
            inner: Arc::new(PoolInner {
                dialer: Dialer::new(transport, &config),
                connect_timeout: config.connect_timeout,
                max_connections: config.max_connections,
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        })
    }

    /// Address this pool dials.
    pub fn address(&self) -> &str {
        self.inner.dialer.address()
    }

    /// Acquires a connection, reusing an idle one or dialing a new one.
    ///
    /// The result must always be handed back to [`Pool::release`], passing
    /// `None` when this call failed: a failed dial still holds the slot it
    /// reserved.
    ///
    /// **Logic**:
    /// 1. Fix the deadline at now + connect timeout.
    /// 2. Pop an idle connection if there is one.
    /// 3. Otherwise reserve a slot if under capacity and dial without the lock.
    /// 4. Otherwise wait for a release and start over.
    pub fn acquire(&self) -> PoolResult<T::Conn> {
        let deadline = Instant::now() + self.inner.connect_timeout;
        let max = self.inner.max_connections;
        let mut state = self.inner.state.lock();

        loop {
            if let Some(conn) = state.idle.pop_front() {
                if state.outstanding < max {
                    state.outstanding += 1;
                }
                trace!(
                    address = self.address(),
                    idle = state.idle.len(),
                    outstanding = state.outstanding,
                    "reusing idle connection"
                );
                return Ok(conn);
            }

            if state.outstanding < max {
                state.outstanding += 1;
                drop(state);
                return self.inner.dialer.connect(deadline);
            }

            // Starvation is possible: waiters are not served FIFO.
            self.inner.available.wait(&mut state);
        }
    }

    /// Returns a connection obtained from [`Pool::acquire`].
    ///
    /// Accepts `None` (failed acquire) and broken connections; both give the
    /// slot back without pooling anything.
    pub fn release(&self, conn: Option<T::Conn>) {
        let mut state = self.inner.state.lock();

        let conn = match conn {
            Some(conn) if !conn.is_broken() => conn,
            _ => {
                state.outstanding = state.outstanding.saturating_sub(1);
                trace!(
                    address = self.address(),
                    outstanding = state.outstanding,
                    "released dead slot"
                );
                self.inner.available.notify_one();
                return;
            }
        };

        if state.idle.len() >= self.inner.max_connections {
            drop(state);
            debug!(address = self.address(), "idle set full, closing connection");
            close_detached(conn);
            return;
        }

        state.idle.push_back(conn);
        state.outstanding = state.outstanding.saturating_sub(1);
        self.inner.available.notify_one();
    }

    /// Acquires a connection wrapped in a guard that releases it on drop.
    ///
    /// Unlike [`Pool::acquire`], a failed dial gives its slot back before
    /// the error is returned.
    pub fn checkout(&self) -> PoolResult<PooledConnection<T>> {
        match self.acquire() {
            Ok(conn) => Ok(PooledConnection {
                pool: self.clone(),
                conn: Some(conn),
            }),
            Err(err) => {
                self.release(None);
                Err(err)
            }
        }
    }

    /// Closes every idle connection and empties the idle set.
    ///
    /// Checked-out connections are left to their holders.
    pub fn shutdown(&self) -> PoolResult<()> {
        let mut state = self.inner.state.lock();
        let count = state.idle.len();
        for mut conn in state.idle.drain(..) {
            conn.close();
        }
        debug!(address = self.address(), closed = count, "pool shut down");
        Ok(())
    }

    /// Returns a snapshot of the pool's accounting.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            idle: state.idle.len(),
            outstanding: state.outstanding,
            max_connections: self.inner.max_connections,
        }
    }
}

// Closing may block on I/O, so it never runs on the releasing thread.
fn close_detached<C: Connection>(mut conn: C) {
    let spawned = thread::Builder::new()
        .name("kvpool-close".to_string())
        .spawn(move || conn.close());
    if let Err(err) = spawned {
        // The connection was dropped with the closure, which closes the socket.
        debug!(error = %err, "close thread unavailable");
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection<T: Transport> {
    pool: Pool<T>,
    conn: Option<T::Conn>,
}

impl<T: Transport> PooledConnection<T> {
    /// Closes the connection and frees its slot without pooling it.
    pub fn discard(mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
            self.pool.release(Some(conn));
        }
    }
}

impl<T: Transport> Deref for PooledConnection<T> {
    type Target = T::Conn;

    fn deref(&self) -> &T::Conn {
        self.conn.as_ref().expect("connection exists")
    }
}

impl<T: Transport> DerefMut for PooledConnection<T> {
    fn deref_mut(&mut self) -> &mut T::Conn {
        self.conn.as_mut().expect("connection exists")
    }
}

impl<T: Transport> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(Some(conn));
        }
    }
}
