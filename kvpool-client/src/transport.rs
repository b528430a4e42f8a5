//! # Transport Seam
//!
//! Purpose: Hide how a shard connection is opened and driven, so the pool
//! only sees an opaque handle that can send, receive, report a broken state,
//! and close.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: `Transport` opens connections; tests swap in fakes.
//! 2. **Sticky Failure**: The first I/O error marks a connection broken for good.
//! 3. **Buffer Reuse**: Each TCP connection keeps its own buffered reader.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use kvpool_common::{PoolConfig, PoolError, PoolResult};

/// Timeouts applied to every dial and to every connection's socket I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Timeouts {
    pub fn from_config(config: &PoolConfig) -> Self {
        Timeouts {
            connect: config.connect_timeout,
            read: config.read_timeout,
            write: config.write_timeout,
        }
    }
}

/// A live connection to a shard.
///
/// A connection is owned by exactly one holder at a time: the pool's idle set
/// or a single caller. After `close`, `is_broken` must return true.
pub trait Connection: Send + 'static {
    /// Writes the whole buffer to the shard.
    fn send(&mut self, data: &[u8]) -> PoolResult<()>;

    /// Reads up to `buf.len()` bytes from the shard.
    fn receive(&mut self, buf: &mut [u8]) -> PoolResult<usize>;

    /// Reports whether the connection failed or was closed.
    fn is_broken(&self) -> bool;

    /// Closes the connection. Errors while closing are ignored.
    fn close(&mut self);
}

/// Opens connections to a shard address.
pub trait Transport: Send + Sync + 'static {
    type Conn: Connection;

    fn open(&self, address: &str, timeouts: &Timeouts) -> PoolResult<Self::Conn>;
}

/// Plain TCP transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Conn = TcpConnection;

    fn open(&self, address: &str, timeouts: &Timeouts) -> PoolResult<TcpConnection> {
        TcpConnection::connect(address, timeouts)
    }
}

/// Single TCP connection with a reusable read buffer.
pub struct TcpConnection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    failed: bool,
    closed: bool,
}

impl TcpConnection {
    fn connect(address: &str, timeouts: &Timeouts) -> PoolResult<Self> {
        let stream = connect_stream(address, timeouts.connect)?;
        stream.set_read_timeout(non_zero(timeouts.read))?;
        stream.set_write_timeout(non_zero(timeouts.write))?;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        Ok(TcpConnection {
            reader: BufReader::new(stream),
            failed: false,
            closed: false,
        })
    }

    /// Reads one CRLF-terminated line into `buf`, without the terminator.
    pub fn receive_line(&mut self, buf: &mut Vec<u8>) -> PoolResult<()> {
        self.ensure_open()?;
        buf.clear();
        let result = self.reader.read_until(b'\n', buf);
        let bytes = self.track(result)?;
        if bytes == 0 {
            self.failed = true;
            return Err(unexpected_eof());
        }
        if buf.ends_with(b"\r\n") {
            buf.truncate(buf.len() - 2);
        } else if buf.ends_with(b"\n") {
            buf.truncate(buf.len() - 1);
        }
        Ok(())
    }

    fn ensure_open(&self) -> PoolResult<()> {
        if self.closed {
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    fn track<T>(&mut self, result: std::io::Result<T>) -> PoolResult<T> {
        result.map_err(|err| {
            self.failed = true;
            PoolError::Io(err)
        })
    }
}

impl Connection for TcpConnection {
    fn send(&mut self, data: &[u8]) -> PoolResult<()> {
        self.ensure_open()?;
        let stream = self.reader.get_mut();
        let result = stream.write_all(data).and_then(|_| stream.flush());
        self.track(result)
    }

    fn receive(&mut self, buf: &mut [u8]) -> PoolResult<usize> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let result = self.reader.read(buf);
        let bytes = self.track(result)?;
        if bytes == 0 {
            // Peer hung up; the connection cannot be reused.
            self.failed = true;
            return Err(unexpected_eof());
        }
        Ok(bytes)
    }

    fn is_broken(&self) -> bool {
        self.failed || self.closed
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }
}

fn connect_stream(address: &str, timeout: Duration) -> PoolResult<TcpStream> {
    let addrs: Vec<SocketAddr> = address
        .to_socket_addrs()
        .map_err(|_| PoolError::InvalidAddress(address.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(PoolError::InvalidAddress(address.to_string()));
    }

    let mut last_err = None;
    for addr in addrs {
        let attempt = match non_zero(timeout) {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.map_or_else(|| PoolError::InvalidAddress(address.to_string()), PoolError::Io))
}

// std rejects zero socket timeouts; zero means "no timeout" here.
fn non_zero(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}

fn unexpected_eof() -> PoolError {
    PoolError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed by peer",
    ))
}
