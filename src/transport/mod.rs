use std::io;
use thiserror::Error;

pub mod tcp;

pub use tcp::TcpProbe;

/// Errors raised while setting up or driving a probed connection
///
/// Every variant is fatal to a run: a failed measurement is reported, never
/// masked.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("congestion control '{name}' rejected by the network stack: {source}")]
    CongestionControl {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("send failed after {sent} bytes: {source}")]
    Send {
        sent: usize,
        #[source]
        source: io::Error,
    },

    #[error("TCP_INFO query failed: {0}")]
    Diagnostics(#[source] io::Error),

    #[error("socket setup failed: {0}")]
    Socket(#[source] io::Error),

    #[error("{0} is only supported on Linux")]
    Unsupported(&'static str),
}

/// Snapshot of the kernel's view of a connection, taken from `TCP_INFO`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportInfo {
    /// Smoothed RTT estimate in microseconds
    pub rtt_us: u32,
    /// RTT variance in microseconds
    pub rtt_var_us: u32,
    /// Sender congestion window in segments
    pub snd_cwnd: u32,
    /// Sender maximum segment size
    pub snd_mss: u32,
    /// Segments sent but not yet acknowledged
    pub unacked: u32,
    /// Retransmissions over the life of the connection
    pub total_retrans: u32,
}

impl TransportInfo {
    /// RTT in milliseconds, truncated only by float precision
    pub fn rtt_ms(&self) -> f64 {
        f64::from(self.rtt_us) / 1000.0
    }
}

/// A byte stream whose transport state can be inspected between sends
///
/// `send` has the semantics of a single `send(2)` call: it may accept fewer
/// bytes than offered and reports how many it took.
pub trait ProbedStream {
    /// Offer `buf` to the transport, returning the number of bytes accepted
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Query the current transport diagnostic state
    fn transport_info(&self) -> Result<TransportInfo, TransportError>;

    /// Close the stream
    fn close(self) -> Result<(), TransportError>
    where
        Self: Sized,
    {
        Ok(())
    }
}
