//! # Dialer
//!
//! Purpose: Establish a new shard connection, retrying failed dials with
//! exponential backoff until an absolute deadline passes.
//!
//! ## Notes
//! - Every dial failure is retried the same way; transient and permanent
//!   errors are not told apart.
//! - A sleep never runs past the deadline, so the caller sees the deadline
//!   error promptly once time is up.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use kvpool_common::{PoolConfig, PoolError, PoolResult};

use crate::transport::{Timeouts, Transport};

/// Doubling delay schedule with an upper bound.
///
/// The first delay is `initial` itself: 10ms, 20ms, 40ms, ... up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Backoff {
            next: initial.min(max),
            max,
        }
    }

    /// Returns the delay before the next retry and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }
}

/// Opens connections to one fixed address.
pub struct Dialer<T: Transport> {
    transport: T,
    address: String,
    timeouts: Timeouts,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl<T: Transport> Dialer<T> {
    pub fn new(transport: T, config: &PoolConfig) -> Self {
        Dialer {
            transport,
            address: config.address.clone(),
            timeouts: Timeouts::from_config(config),
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Dials until a connection opens or `deadline` passes.
    ///
    /// **Logic**:
    /// 1. Fail with `DialDeadline` once the deadline is reached.
    /// 2. Try to open a connection; return it on success.
    /// 3. On failure, log, sleep for the next backoff step, and retry.
    pub fn connect(&self, deadline: Instant) -> PoolResult<T::Conn> {
        let mut backoff = Backoff::new(self.initial_backoff, self.max_backoff);
        let mut attempt: u32 = 0;

        loop {
            if Instant::now() >= deadline {
                return Err(PoolError::DialDeadline {
                    address: self.address.clone(),
                });
            }

            attempt += 1;
            match self.transport.open(&self.address, &self.timeouts) {
                Ok(conn) => {
                    debug!(address = %self.address, attempt, "dialed shard");
                    return Ok(conn);
                }
                Err(err) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let delay = backoff.next_delay().min(remaining);
                    warn!(
                        address = %self.address,
                        attempt,
                        error = %err,
                        backoff_ms = delay.as_millis() as u64,
                        "dial failed"
                    );
                    thread::sleep(delay);
                }
            }
        }
    }
}
