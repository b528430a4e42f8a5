//! In-memory transport used by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use kvpool_common::{PoolError, PoolResult};

use crate::transport::{Connection, Timeouts, Transport};

/// Shared view of a fake connection's state.
#[derive(Clone, Default)]
pub struct ConnProbe {
    broken: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl ConnProbe {
    pub fn break_it(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeConn {
    pub id: usize,
    probe: ConnProbe,
}

impl FakeConn {
    pub fn new(id: usize) -> Self {
        FakeConn {
            id,
            probe: ConnProbe::default(),
        }
    }

    pub fn probe(&self) -> ConnProbe {
        self.probe.clone()
    }
}

impl Connection for FakeConn {
    fn send(&mut self, _data: &[u8]) -> PoolResult<()> {
        if self.is_broken() {
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    fn receive(&mut self, _buf: &mut [u8]) -> PoolResult<usize> {
        if self.is_broken() {
            return Err(PoolError::Closed);
        }
        Ok(0)
    }

    fn is_broken(&self) -> bool {
        self.probe.broken.load(Ordering::SeqCst) || self.probe.closed.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.probe.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    fail_first: usize,
    attempts: Arc<AtomicUsize>,
    dials: Arc<AtomicUsize>,
    stamps: Arc<Mutex<Vec<Instant>>>,
}

impl FakeTransport {
    pub fn failing_first(count: usize) -> Self {
        FakeTransport {
            fail_first: count,
            ..FakeTransport::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    /// Every call to `open`, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successful opens only.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.stamps.lock().clone()
    }
}

impl Transport for FakeTransport {
    type Conn = FakeConn;

    fn open(&self, _address: &str, _timeouts: &Timeouts) -> PoolResult<FakeConn> {
        self.stamps.lock().push(Instant::now());
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(PoolError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }
        let id = self.dials.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConn::new(id))
    }
}
