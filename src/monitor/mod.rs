use crate::{cli::MonitorArgs, series::SeriesWriter};
use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

pub mod parse;
pub mod source;

pub use crate::cli::KernelMetric;
pub use parse::{parse_metric_line, LineError, MetricRecord};
pub use source::{CommandStream, LogInput, LogSource};

/// Validated configuration for the kernel metric monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub output_dir: PathBuf,
    pub label: String,
    pub metric: KernelMetric,
    pub source: LogSource,
}

impl MonitorConfig {
    /// Build the monitor configuration from parsed CLI arguments
    ///
    /// `--input` takes precedence over `--source-cmd`; clap already rejects
    /// giving both explicitly. An empty source command is an error.
    pub fn from_args(args: &MonitorArgs) -> Result<Self> {
        let source = match &args.input {
            Some(path) => LogSource::File(path.clone()),
            None => LogSource::command(&args.source_cmd)?,
        };

        Ok(Self {
            output_dir: args.output_directory.clone(),
            label: args.label.clone(),
            metric: args.metric,
            source,
        })
    }
}

/// What happened to one input line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// A sample was appended to the series
    Emitted { elapsed: f64, value: i64 },
    /// Not a line for the selected metric
    Ignored,
    /// Carried the selected metric but could not be parsed; skipped
    Malformed(LineError),
}

/// Line counters for one tailing session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailStats {
    pub lines: u64,
    pub emitted: u64,
    pub ignored: u64,
    pub malformed: u64,
}

/// Converts a stream of kernel log lines into a relative-time metric series
///
/// The first usable line for the selected metric fixes the origin; every
/// sample reports `timestamp - origin`, so the series starts at 0.0 whatever
/// the log's clock base. The origin is only ever set by a line that also
/// produces a sample.
pub struct LogTailer<W: Write> {
    metric: KernelMetric,
    origin: Option<f64>,
    series: SeriesWriter<W>,
    stats: TailStats,
}

impl<W: Write> LogTailer<W> {
    /// Create a tailer for `metric`
    ///
    /// ## Parameters
    /// - `metric`: The identifier whose lines are kept; all others are ignored
    /// - `series`: Destination series, normally created with
    ///   [`OutputFiles::create_kernel_series`](crate::series::OutputFiles::create_kernel_series)
    ///   so each sample is flushed as it arrives
    pub fn new(metric: KernelMetric, series: SeriesWriter<W>) -> Self {
        Self {
            metric,
            origin: None,
            series,
            stats: TailStats::default(),
        }
    }

    /// The metric this tailer extracts
    pub fn metric(&self) -> KernelMetric {
        self.metric
    }

    /// Timestamp of the first matched line, once one has been seen
    pub fn origin(&self) -> Option<f64> {
        self.origin
    }

    pub fn stats(&self) -> TailStats {
        self.stats
    }

    /// Handle one line (without its trailing newline)
    ///
    /// ## Parameters
    /// - `line`: A kernel log line, with or without a metric record
    ///
    /// ## Returns
    /// - `Ok(LineOutcome::Emitted)`: a sample was written; the first such line
    ///   fixes the origin
    /// - `Ok(LineOutcome::Ignored)`: not a line for this metric
    /// - `Ok(LineOutcome::Malformed)`: this metric's id, but an unusable
    ///   timestamp or value; logged and skipped
    /// - `Err`: the series could not be written
    pub fn process_line(&mut self, line: &str) -> io::Result<LineOutcome> {
        self.stats.lines += 1;

        let record = match parse_metric_line(line, self.metric.id()) {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.stats.ignored += 1;
                return Ok(LineOutcome::Ignored);
            }
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Skipping malformed {} line ({}): {:?}", self.metric, e, line);
                return Ok(LineOutcome::Malformed(e));
            }
        };

        let origin = *self.origin.get_or_insert_with(|| {
            debug!("Series origin set at {:.6}", record.timestamp);
            record.timestamp
        });
        let elapsed = record.timestamp - origin;

        self.series.record_integer(elapsed, record.value)?;
        self.stats.emitted += 1;
        Ok(LineOutcome::Emitted {
            elapsed,
            value: record.value,
        })
    }

    /// Consume `reader` until it closes, then flush the series
    ///
    /// Invalid UTF-8 in a line is replaced rather than treated as an error;
    /// the tracking module only prints ASCII, so such lines never match.
    pub fn run<R: BufRead>(mut self, mut reader: R) -> Result<TailStats> {
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .context("Failed to read from log source")?;
            if n == 0 {
                debug!("Log source closed, series origin {:?}", self.origin());
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
            self.process_line(line)
                .with_context(|| format!("Failed to write {} sample", self.series.name()))?;
        }

        let stats = self.stats();
        self.series
            .finish()
            .context("Failed to flush metric series")?;
        Ok(stats)
    }
}
