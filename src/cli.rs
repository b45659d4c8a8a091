use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bulk-transfer client: streams a payload under a chosen congestion-control
/// algorithm and records RTT, sending rate and flow completion time
#[derive(Parser, Debug, Clone)]
#[clap(name = "cc-client", version, about, long_about = None)]
pub struct ClientArgs {
    /// Congestion-control algorithm to use (e.g. cubic, reno, bbr)
    pub congestion_control: String,

    /// Directory the series files are written to
    pub output_path: PathBuf,

    /// Receiver host
    #[clap(long, default_value = crate::defaults::HOST, help_heading = "Connection")]
    pub host: String,

    /// Receiver port
    #[clap(short = 'p', long, default_value_t = crate::defaults::PORT, help_heading = "Connection")]
    pub port: u16,

    /// Total bytes to send
    #[clap(short = 's', long, default_value_t = crate::defaults::PAYLOAD_SIZE)]
    pub payload_size: usize,

    /// Bytes offered to the socket per send call
    #[clap(short = 'c', long, default_value_t = crate::defaults::CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Prefix for output file names
    #[clap(long, default_value = crate::defaults::LABEL, help_heading = "Output")]
    pub label: String,

    /// Do not write the JSON run summary
    #[clap(long, default_value_t = false, help_heading = "Output")]
    pub no_summary: bool,

    /// Also write logs to this file
    #[clap(long, help_heading = "Output")]
    pub log_file: Option<PathBuf>,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

/// Kernel metric monitor: follows the kernel log and extracts one metric
/// emitted by the tracking module as a relative-time series
#[derive(Parser, Debug, Clone)]
#[clap(name = "cwnd-monitor", version, about, long_about = None)]
pub struct MonitorArgs {
    /// Directory the series file is written to
    pub output_directory: PathBuf,

    /// Metric to extract
    #[clap(short = 'm', long, value_enum, default_value_t = KernelMetric::Cwnd)]
    pub metric: KernelMetric,

    /// Command whose stdout is followed
    #[clap(long, default_value = crate::defaults::SOURCE_COMMAND, conflicts_with = "input")]
    pub source_cmd: String,

    /// Read a captured log file instead of running the source command
    #[clap(short = 'i', long)]
    pub input: Option<PathBuf>,

    /// Prefix for the output file name
    #[clap(long, default_value = crate::defaults::LABEL, help_heading = "Output")]
    pub label: String,

    /// Also write logs to this file
    #[clap(long, help_heading = "Output")]
    pub log_file: Option<PathBuf>,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

/// Drain sink: accepts connections and discards everything received
#[derive(Parser, Debug, Clone)]
#[clap(name = "cc-sink", version, about, long_about = None)]
pub struct SinkArgs {
    /// Address to listen on
    #[clap(long, default_value = crate::defaults::SINK_HOST)]
    pub host: String,

    /// Port to listen on
    #[clap(short = 'p', long, default_value_t = crate::defaults::PORT)]
    pub port: u16,

    /// Per-connection read buffer in bytes
    #[clap(long, default_value_t = crate::defaults::SINK_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

/// Metric identifiers printed by the in-kernel tracking module
///
/// Each log line carries one of these as its first field after the
/// timestamp. The BBR phase markers carry the pacing gain as their value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum KernelMetric {
    /// Congestion window
    #[clap(name = "cwnd")]
    Cwnd,
    /// Bandwidth-delay product
    #[clap(name = "bdp")]
    Bdp,
    /// Bandwidth estimate
    #[clap(name = "bw")]
    Bw,
    /// Bytes in flight
    #[clap(name = "inflight")]
    Inflight,
    /// Delivery rate
    #[clap(name = "rate")]
    Rate,
    /// Round-trip time
    #[clap(name = "rtt")]
    Rtt,
    /// Minimum RTT
    #[clap(name = "min-rtt")]
    MinRtt,
    /// BBR STARTUP phase entered
    #[clap(name = "startup")]
    Startup,
    /// BBR DRAIN phase entered
    #[clap(name = "drain")]
    Drain,
    /// BBR PROBE_BW phase entered
    #[clap(name = "probe-bw")]
    ProbeBw,
    /// BBR PROBE_RTT phase entered
    #[clap(name = "probe-rtt")]
    ProbeRtt,
}

impl KernelMetric {
    /// Numeric identifier as printed in the kernel log
    pub fn id(self) -> i64 {
        match self {
            KernelMetric::Cwnd => 1,
            KernelMetric::Bdp => 2,
            KernelMetric::Bw => 3,
            KernelMetric::Inflight => 4,
            KernelMetric::Rate => 5,
            KernelMetric::Rtt => 6,
            KernelMetric::MinRtt => 7,
            KernelMetric::Startup => 11,
            KernelMetric::Drain => 22,
            KernelMetric::ProbeBw => 33,
            KernelMetric::ProbeRtt => 44,
        }
    }

    /// Upper-case tag used in output file names
    pub fn file_tag(self) -> &'static str {
        match self {
            KernelMetric::Cwnd => "CWND",
            KernelMetric::Bdp => "BDP",
            KernelMetric::Bw => "BW",
            KernelMetric::Inflight => "INFLIGHT",
            KernelMetric::Rate => "RATE",
            KernelMetric::Rtt => "RTT",
            KernelMetric::MinRtt => "MIN-RTT",
            KernelMetric::Startup => "STARTUP",
            KernelMetric::Drain => "DRAIN",
            KernelMetric::ProbeBw => "PROBE-BW",
            KernelMetric::ProbeRtt => "PROBE-RTT",
        }
    }

    /// Series name used in logs
    pub fn series_name(self) -> &'static str {
        match self {
            KernelMetric::Cwnd => "kernel_cwnd",
            KernelMetric::Bdp => "kernel_bdp",
            KernelMetric::Bw => "kernel_bw",
            KernelMetric::Inflight => "kernel_inflight",
            KernelMetric::Rate => "kernel_rate",
            KernelMetric::Rtt => "kernel_rtt",
            KernelMetric::MinRtt => "kernel_min_rtt",
            KernelMetric::Startup => "kernel_bbr_startup",
            KernelMetric::Drain => "kernel_bbr_drain",
            KernelMetric::ProbeBw => "kernel_bbr_probe_bw",
            KernelMetric::ProbeRtt => "kernel_bbr_probe_rtt",
        }
    }
}

impl std::fmt::Display for KernelMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelMetric::Cwnd => write!(f, "Congestion Window"),
            KernelMetric::Bdp => write!(f, "Bandwidth-Delay Product"),
            KernelMetric::Bw => write!(f, "Bandwidth"),
            KernelMetric::Inflight => write!(f, "Inflight"),
            KernelMetric::Rate => write!(f, "Delivery Rate"),
            KernelMetric::Rtt => write!(f, "RTT"),
            KernelMetric::MinRtt => write!(f, "Min RTT"),
            KernelMetric::Startup => write!(f, "BBR Startup"),
            KernelMetric::Drain => write!(f, "BBR Drain"),
            KernelMetric::ProbeBw => write!(f, "BBR Probe BW"),
            KernelMetric::ProbeRtt => write!(f, "BBR Probe RTT"),
        }
    }
}
