//! Append-only metric series and the files that hold them.
//!
//! Every series line is `<elapsed_seconds>\t<value>` with elapsed time printed
//! to six decimals, the layout external plotting scripts expect. Samples are
//! written in the order they are recorded and never rewritten.

use crate::monitor::KernelMetric;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writer for one `(elapsed, value)` series
///
/// Wraps any [`Write`]; the binaries hand it a `BufWriter<File>`, tests a
/// `Vec<u8>`. The writer keeps a sample count so callers can report how many
/// lines a series ended up with.
pub struct SeriesWriter<W: Write> {
    name: &'static str,
    writer: W,
    flush_each: bool,
    samples: usize,
}

impl<W: Write> SeriesWriter<W> {
    /// Create a series writer
    ///
    /// ## Parameters
    /// - `name`: Short series name used in log and error messages
    /// - `writer`: Destination for the tab-separated lines
    ///
    /// Nothing is written until the first sample is recorded.
    pub fn new(name: &'static str, writer: W) -> Self {
        Self {
            name,
            writer,
            flush_each: false,
            samples: 0,
        }
    }

    /// Flush after every sample so concurrent readers (live plots) see it
    pub fn flush_each_sample(mut self) -> Self {
        self.flush_each = true;
        self
    }

    /// Append a sample with a two-decimal value (`%.6f\t%.2f`)
    ///
    /// ## Parameters
    /// - `elapsed`: Seconds since the series origin
    /// - `value`: Sample value, rounded to two decimals on output
    ///
    /// ## Returns
    /// The first I/O error from the underlying writer, or from the flush when
    /// [`flush_each_sample`](Self::flush_each_sample) is on.
    pub fn record(&mut self, elapsed: f64, value: f64) -> io::Result<()> {
        writeln!(self.writer, "{:.6}\t{:.2}", elapsed, value)?;
        self.after_write()
    }

    /// Append a sample with an integer value (`%.6f\t%d`)
    pub fn record_integer(&mut self, elapsed: f64, value: i64) -> io::Result<()> {
        writeln!(self.writer, "{:.6}\t{}", elapsed, value)?;
        self.after_write()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of samples appended so far
    pub fn len(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Push buffered lines to the underlying writer
    ///
    /// The sampler calls this once at the end of a run rather than per
    /// sample, keeping file I/O out of the send loop.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Flush and hand back the underlying writer
    ///
    /// ## Returns
    /// The writer, so tests can inspect an in-memory buffer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn after_write(&mut self) -> io::Result<()> {
        self.samples += 1;
        if self.flush_each {
            self.writer.flush()?;
        }
        Ok(())
    }
}

/// Single-value sink for the flow completion time
///
/// Holds exactly one `%.6f` value with no trailing newline.
pub struct FlowCompletionWriter<W: Write> {
    writer: W,
    recorded: bool,
}

impl<W: Write> FlowCompletionWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            recorded: false,
        }
    }

    /// Write the flow completion time
    ///
    /// ## Parameters
    /// - `elapsed`: Seconds from transfer start to the send that completed it
    ///
    /// ## Returns
    /// An error if a value was already recorded; the file never holds more
    /// than one value.
    pub fn record(&mut self, elapsed: f64) -> io::Result<()> {
        if self.recorded {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "flow completion time already recorded",
            ));
        }
        write!(self.writer, "{:.6}", elapsed)?;
        self.recorded = true;
        Ok(())
    }

    pub fn is_recorded(&self) -> bool {
        self.recorded
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// The three sinks fed by the transfer sampler
pub struct TransferSinks<W: Write> {
    pub sending_rate: SeriesWriter<W>,
    pub rtt: SeriesWriter<W>,
    pub flow_completion: FlowCompletionWriter<W>,
}

impl<W: Write> TransferSinks<W> {
    pub fn new(sending_rate: W, rtt: W, flow_completion: W) -> Self {
        Self {
            sending_rate: SeriesWriter::new("sending_rate", sending_rate),
            rtt: SeriesWriter::new("rtt", rtt),
            flow_completion: FlowCompletionWriter::new(flow_completion),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.sending_rate.flush()?;
        self.rtt.flush()?;
        self.flow_completion.flush()
    }

    /// Flush all sinks, returning the writers in (rate, rtt, fct) order
    pub fn finish(self) -> io::Result<(W, W, W)> {
        Ok((
            self.sending_rate.finish()?,
            self.rtt.finish()?,
            self.flow_completion.finish()?,
        ))
    }
}

/// Output file layout: `<dir>/<label>-<SERIES>.dat`
#[derive(Debug, Clone)]
pub struct OutputFiles {
    dir: PathBuf,
    label: String,
}

impl OutputFiles {
    /// Describe the layout under `dir`
    ///
    /// ## Parameters
    /// - `dir`: Existing output directory; it is never created here
    /// - `label`: File name prefix, `H1-H2` by default
    ///
    /// No file is touched until one of the `create_*` methods is called.
    pub fn new<P: AsRef<Path>>(dir: P, label: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            label: label.to_string(),
        }
    }

    pub fn sending_rate_path(&self) -> PathBuf {
        self.series_path("SENDING-RATE")
    }

    pub fn rtt_path(&self) -> PathBuf {
        self.series_path("RTT")
    }

    pub fn flow_completion_path(&self) -> PathBuf {
        self.series_path("FLOW-COMPLETION-TIME")
    }

    pub fn kernel_metric_path(&self, metric: KernelMetric) -> PathBuf {
        self.series_path(&format!("KERNEL-{}", metric.file_tag()))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(format!("{}-SUMMARY.json", self.label))
    }

    /// Create (truncating) the three transfer series files
    ///
    /// ## Returns
    /// - `Ok(TransferSinks)`: all three files are open
    /// - `Err`: the first file that could not be created, with its path in
    ///   the error context. Files opened before it are left empty.
    pub fn create_transfer_sinks(&self) -> Result<TransferSinks<BufWriter<File>>> {
        Ok(TransferSinks::new(
            create(&self.sending_rate_path())?,
            create(&self.rtt_path())?,
            create(&self.flow_completion_path())?,
        ))
    }

    /// Create the kernel metric series, flushed after every sample
    pub fn create_kernel_series(
        &self,
        metric: KernelMetric,
    ) -> Result<SeriesWriter<BufWriter<File>>> {
        let writer = create(&self.kernel_metric_path(metric))?;
        Ok(SeriesWriter::new(metric.series_name(), writer).flush_each_sample())
    }

    fn series_path(&self, series: &str) -> PathBuf {
        self.dir.join(format!("{}-{}.dat", self.label, series))
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to open output file {}", path.display()))?;
    Ok(BufWriter::new(file))
}
