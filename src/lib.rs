//! # TCP Congestion-Control Measurement Harness
//!
//! Tools for observing how the congestion-control algorithms shipped with the
//! Linux network stack behave under a bulk transfer.
//!
//! ## Components
//!
//! - **Transfer Sampler** (`sampler`): streams a fixed-size payload over a TCP
//!   connection configured with a chosen congestion-control algorithm and, on
//!   every send, samples `TCP_INFO` to produce RTT, sending-rate and
//!   flow-completion-time series.
//! - **Log Tailer** (`monitor`): follows the kernel log and turns the metric
//!   lines emitted by an in-kernel instrumentation module into a relative-time
//!   congestion-window series.
//! - **Drain Sink** (`sink`): a receiver that accepts the sampler's connection
//!   and discards everything it reads.
//!
//! ## Architecture Overview
//!
//! - `cli`: Command-line argument definitions for the three binaries
//! - `transport`: The `ProbedStream` abstraction and the Linux TCP implementation
//! - `sampler`: The bulk send loop and its sampling rules
//! - `series`: Tab-separated metric series writers and output file naming
//! - `metrics`: RTT statistics using HDR histograms
//! - `results`: The JSON run summary
//! - `monitor`: Kernel log parsing and the tailing loop
//! - `sink`: Tokio-based drain server
//! - `logging`: Tracing subscriber setup
//! - `utils`: Formatting and validation helpers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use tcp_cc_bench::{
//!     sampler::{TransferConfig, TransferSampler},
//!     series::OutputFiles,
//!     transport::TcpProbe,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = TransferConfig {
//!         congestion_control: "cubic".to_string(),
//!         destination: "10.0.0.2:1234".parse()?,
//!         payload_size: 4 * 1024 * 1024,
//!         chunk_size: 1024,
//!     };
//!
//!     let probe = TcpProbe::connect(config.destination, &config.congestion_control)?;
//!     let mut sinks = OutputFiles::new("/tmp/run", "H1-H2").create_transfer_sinks()?;
//!     let report = TransferSampler::new(config, probe).run(&mut sinks)?;
//!
//!     println!("Flow completed in {:.6}s", report.flow_completion.as_secs_f64());
//!     Ok(())
//! }
//! ```

/// Command-line interface definitions
///
/// Argument structs for `cc-client`, `cwnd-monitor` and `cc-sink`, parsed with
/// the clap derive API.
pub mod cli;

pub mod logging;

/// RTT statistics
///
/// Every RTT sample taken during a transfer is recorded into an HDR histogram
/// so the run summary can report percentiles without keeping the raw series
/// in memory.
pub mod metrics;

/// Kernel log tailing
///
/// Parses the instrumentation module's metric lines and converts the selected
/// metric into a series whose first sample is at elapsed time zero.
pub mod monitor;

/// Run summary output
///
/// A JSON document written next to the series files at the end of a
/// successful transfer, for reproducibility.
pub mod results;

/// The measurement sampling loop
///
/// Interleaves bulk sends with `TCP_INFO` queries and emits the RTT,
/// sending-rate and flow-completion-time series.
pub mod sampler;

/// Metric series sinks
pub mod series;

pub mod sink;

/// Transport abstraction
///
/// The sampler drives anything implementing `ProbedStream`; `TcpProbe` is the
/// real socket.
pub mod transport;

pub mod utils;

pub use monitor::{KernelMetric, LogTailer, MonitorConfig};
pub use sampler::{TransferConfig, TransferReport, TransferSampler};
pub use series::{OutputFiles, SeriesWriter};
pub use transport::{ProbedStream, TcpProbe, TransportError, TransportInfo};

/// The current version of the harness, recorded in every run summary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// These mirror the testbed the harness was built for: a sender at 10.0.0.1
/// pushing to a receiver at 10.0.0.2 across an emulated wireless topology.
pub mod defaults {
    /// Destination host for the bulk transfer
    pub const HOST: &str = "10.0.0.2";

    /// Destination TCP port
    pub const PORT: u16 = 1234;

    /// Address the drain sink listens on
    pub const SINK_HOST: &str = "0.0.0.0";

    /// Total payload pushed by one run (120 MiB)
    pub const PAYLOAD_SIZE: usize = 120 * 1024 * 1024;

    /// Bytes offered to the socket per send call
    ///
    /// Small chunks mean one `TCP_INFO` sample per KiB handed to the kernel,
    /// which gives the RTT series a fine time resolution.
    pub const CHUNK_SIZE: usize = 1024;

    /// Prefix of every output file name (sender-receiver host pair)
    pub const LABEL: &str = "H1-H2";

    /// Command whose stdout is tailed by the cwnd monitor
    pub const SOURCE_COMMAND: &str = "dmesg --follow";

    /// Read buffer used by the drain sink per connection
    pub const SINK_BUFFER_SIZE: usize = 64 * 1024;
}
