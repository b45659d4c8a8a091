//! # Drain Sink
//!
//! The receiving end of a transfer. Accepts any number of connections and
//! reads each one to EOF, throwing the bytes away. Nothing is ever written
//! back, so the sender's congestion control is the only thing shaping the
//! flow.

use crate::{cli::SinkArgs, utils};
use anyhow::{Context, Result};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub host: String,
    pub port: u16,
    pub buffer_size: usize,
}

impl SinkConfig {
    pub fn from_args(args: &SinkArgs) -> Result<Self> {
        utils::validate_buffer_size(args.buffer_size)?;
        Ok(Self {
            host: args.host.clone(),
            port: args.port,
            buffer_size: args.buffer_size,
        })
    }
}

/// Result of draining one connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrainStats {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl DrainStats {
    pub fn goodput_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 * 8.0 / secs / 1_000_000.0
        } else {
            0.0
        }
    }
}

/// Running totals across all connections
#[derive(Debug, Default)]
pub struct SinkTotals {
    connections: AtomicU64,
    bytes: AtomicU64,
}

impl SinkTotals {
    /// Connections fully drained
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

pub struct DrainSink {
    listener: TcpListener,
    buffer_size: usize,
    totals: Arc<SinkTotals>,
}

impl DrainSink {
    pub async fn bind(config: &SinkConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to listen on {}", addr))?;
        debug!("Drain sink bound to {}", listener.local_addr()?);

        Ok(Self {
            listener,
            buffer_size: config.buffer_size,
            totals: Arc::new(SinkTotals::default()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn totals(&self) -> Arc<SinkTotals> {
        self.totals.clone()
    }

    /// Accept and drain connections until `shutdown` resolves
    ///
    /// Connections already being drained keep running on their own tasks.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Drain sink listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);
        let mut next_id = 0u64;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(
                        "Drain sink stopping: {} connections, {} received",
                        self.totals.connections(),
                        utils::format_bytes(self.totals.bytes() as usize)
                    );
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            // Per-connection failures (e.g. ECONNABORTED) do not stop the sink.
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    next_id += 1;
                    let id = next_id;
                    info!("Connection {} from {}", id, peer);
                    log_congestion_control(id, &stream);

                    let totals = self.totals.clone();
                    let buffer_size = self.buffer_size;
                    tokio::spawn(async move {
                        match drain_connection(stream, buffer_size).await {
                            Ok(stats) => {
                                totals.bytes.fetch_add(stats.bytes, Ordering::Relaxed);
                                totals.connections.fetch_add(1, Ordering::Relaxed);
                                info!(
                                    "Connection {} closed: {} in {}, {:.2} Mbit/s",
                                    id,
                                    utils::format_bytes(stats.bytes as usize),
                                    utils::format_duration(stats.elapsed),
                                    stats.goodput_mbps()
                                );
                            }
                            Err(e) => error!("Connection {} failed: {}", id, e),
                        }
                    });
                }
            }
        }
    }
}

/// Read `stream` to EOF, discarding the data
pub async fn drain_connection(mut stream: TcpStream, buffer_size: usize) -> io::Result<DrainStats> {
    let mut buffer = vec![0u8; buffer_size];
    let mut bytes = 0u64;
    let start = Instant::now();

    loop {
        match stream.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => bytes += n as u64,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(DrainStats {
        bytes,
        elapsed: start.elapsed(),
    })
}

#[cfg(target_os = "linux")]
fn log_congestion_control(id: u64, stream: &TcpStream) {
    match socket2::SockRef::from(stream).tcp_congestion() {
        Ok(name) => debug!(
            "Connection {} receiver congestion control: {}",
            id,
            String::from_utf8_lossy(&name).trim_end_matches('\0')
        ),
        Err(e) => debug!("Connection {}: congestion control unavailable: {}", id, e),
    }
}

#[cfg(not(target_os = "linux"))]
fn log_congestion_control(_id: u64, _stream: &TcpStream) {}
