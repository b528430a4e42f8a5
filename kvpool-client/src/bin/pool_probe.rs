//! # Pool Probe
//!
//! Purpose: Drive a live shard pool from several threads and report how the
//! pool's accounting ends up, as a quick smoke test against a real server.
//!
//! Usage: `pool_probe <address> [workers] [rounds] [max_connections]`
//!
//! Each worker checks out a connection, sends a RESP `PING`, reads one reply
//! line, and returns the connection. Set `RUST_LOG=debug` to see dial retries.

use std::env;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kvpool_client::{Connection, Pool, PoolConfig};

const DEFAULT_WORKERS: usize = 8;
const DEFAULT_ROUNDS: usize = 100;
const DEFAULT_MAX_CONNECTIONS: usize = 4;

const PING: &[u8] = b"*1\r\n$4\r\nPING\r\n";

struct ProbeConfig {
    address: String,
    workers: usize,
    rounds: usize,
    max_connections: usize,
}

impl ProbeConfig {
    fn from_args() -> anyhow::Result<Self> {
        let mut args = env::args().skip(1);
        let address = match args.next() {
            Some(address) => address,
            None => bail!("usage: pool_probe <address> [workers] [rounds] [max_connections]"),
        };
        Ok(ProbeConfig {
            address,
            workers: parse_usize(args.next(), DEFAULT_WORKERS)?,
            rounds: parse_usize(args.next(), DEFAULT_ROUNDS)?,
            max_connections: parse_usize(args.next(), DEFAULT_MAX_CONNECTIONS)?,
        })
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> anyhow::Result<usize> {
    match value {
        Some(raw) => raw.parse().with_context(|| format!("invalid number: {raw}")),
        None => Ok(fallback),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run() {
        eprintln!("pool_probe failed: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let probe = ProbeConfig::from_args()?;
    let config = PoolConfig {
        address: probe.address.clone(),
        max_connections: probe.max_connections,
        ..PoolConfig::default()
    };
    let pool = Pool::with_config(config).context("building pool")?;

    let start = Instant::now();
    let workers: Vec<_> = (0..probe.workers)
        .map(|worker| {
            let pool = pool.clone();
            let rounds = probe.rounds;
            thread::spawn(move || ping_rounds(&pool, worker, rounds))
        })
        .collect();

    let mut ok = 0;
    let mut failed = 0;
    for handle in workers {
        match handle.join() {
            Ok((worker_ok, worker_failed)) => {
                ok += worker_ok;
                failed += worker_failed;
            }
            Err(_) => bail!("worker thread panicked"),
        }
    }
    let elapsed = start.elapsed();

    let stats = pool.stats();
    info!(
        ok,
        failed,
        elapsed_ms = elapsed.as_millis() as u64,
        idle = stats.idle,
        outstanding = stats.outstanding,
        max_connections = stats.max_connections,
        "probe finished"
    );
    pool.shutdown()?;

    if failed > 0 && ok == 0 {
        bail!("no successful pings against {}", probe.address);
    }
    Ok(())
}

fn ping_rounds(pool: &Pool, worker: usize, rounds: usize) -> (usize, usize) {
    let mut ok = 0;
    let mut failed = 0;
    let mut line = Vec::with_capacity(64);

    for _ in 0..rounds {
        let mut conn = match pool.checkout() {
            Ok(conn) => conn,
            Err(err) => {
                warn!(worker, error = %err, "checkout failed");
                failed += 1;
                thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        let reply = conn.send(PING).and_then(|_| conn.receive_line(&mut line));
        match reply {
            Ok(()) if line.starts_with(b"+") => ok += 1,
            Ok(()) => {
                warn!(worker, reply = %String::from_utf8_lossy(&line), "unexpected reply");
                failed += 1;
                conn.discard();
            }
            Err(err) => {
                warn!(worker, error = %err, "ping failed");
                failed += 1;
            }
        }
    }

    (ok, failed)
}
