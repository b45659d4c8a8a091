//! # Transfer Sampler
//!
//! Pushes a fixed-size payload through a [`ProbedStream`] and, after every
//! send call, samples the transport state.
//!
//! ## Per-iteration protocol
//!
//! 1. Offer `min(chunk_size, remaining)` bytes at the current offset
//! 2. Advance by the count the transport actually accepted
//! 3. Read the monotonic clock
//! 4. Query `TCP_INFO` and append `(elapsed, rtt_ms)` to the RTT series
//! 5. On entering a new whole second, append `(elapsed, rate_mbps)` to the
//!    sending-rate series
//! 6. On the iteration that completes the payload, record the flow
//!    completion time
//!
//! Send and query failures abort the run. The payload buffer, the socket and
//! the sinks are owned values, so they are released on every exit path.
//!
//! ## Sending rate
//!
//! The rate is `bytes_sent * 8 / whole_seconds / 1e6`. It is a cumulative
//! average, not a windowed throughput estimate, and is emitted at most once per
//! whole second so sub-second noise never reaches the series.

use crate::{
    cli::ClientArgs,
    metrics::{RttCollector, RttSummary},
    series::TransferSinks,
    transport::{ProbedStream, TransportError, TransportInfo},
    utils,
};
use anyhow::{anyhow, Context, Result};
use rand::RngCore;
use std::io::{self, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Connection parameters for one transfer
///
/// Fixed at setup and never changed during the run.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Congestion-control algorithm name, validated by the kernel
    pub congestion_control: String,
    /// Receiver endpoint
    pub destination: SocketAddr,
    /// Total bytes to send
    pub payload_size: usize,
    /// Bytes offered per send call
    pub chunk_size: usize,
}

impl TransferConfig {
    /// Build and validate a configuration from parsed CLI arguments
    ///
    /// The host is resolved here so name-resolution failures are reported as
    /// setup errors before any socket is created.
    pub fn from_args(args: &ClientArgs) -> Result<Self> {
        utils::validate_congestion_control(&args.congestion_control)?;
        utils::validate_payload_size(args.payload_size)?;
        utils::validate_chunk_size(args.chunk_size)?;

        let destination = (args.host.as_str(), args.port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}:{}", args.host, args.port))?
            .next()
            .ok_or_else(|| anyhow!("No address found for {}:{}", args.host, args.port))?;

        Ok(Self {
            congestion_control: args.congestion_control.clone(),
            destination,
            payload_size: args.payload_size,
            chunk_size: args.chunk_size,
        })
    }
}

/// Whole-second gate for the sending-rate series
///
/// Remembers the last whole second a sample was emitted for. The sampler
/// asks it after every send whether the current elapsed time has crossed
/// into a new second.
#[derive(Debug, Default)]
pub struct RateTracker {
    last_whole_secs: u64,
}

impl RateTracker {
    /// Create a tracker that has not emitted anything yet
    ///
    /// The `(0, 0)` origin sample is written by the sampler itself, so the
    /// first sample this tracker yields is at one whole second.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the rate to emit at `elapsed`, if a new whole second was entered
    ///
    /// ## Parameters
    /// - `elapsed`: Time since the transfer started
    /// - `total_bytes`: Bytes accepted by the transport so far
    ///
    /// ## Returns
    /// - `Some(mbps)`: `elapsed` lies in a whole second later than the last
    ///   one emitted; the value is [`sending_rate_mbps`] over that second count
    /// - `None`: still in the first second, or in a second already emitted
    ///
    /// When a single send blocks across several seconds, only the second it
    /// returns in is emitted; skipped seconds are not backfilled.
    pub fn observe(&mut self, elapsed: Duration, total_bytes: usize) -> Option<f64> {
        let whole_secs = elapsed.as_secs();
        if whole_secs == 0 || whole_secs <= self.last_whole_secs {
            return None;
        }
        self.last_whole_secs = whole_secs;
        Some(sending_rate_mbps(total_bytes, whole_secs))
    }
}

/// Cumulative sending rate in megabits per second over `whole_secs`
///
/// ## Parameters
/// - `total_bytes`: Bytes sent since the start of the transfer
/// - `whole_secs`: Elapsed time truncated to whole seconds, at least 1
///
/// ## Returns
/// `total_bytes * 8 / whole_secs / 1e6`. Dividing by the truncated second
/// count means the value is an average since the start, biased high just
/// before each second boundary, and not an instantaneous throughput.
pub fn sending_rate_mbps(total_bytes: usize, whole_secs: u64) -> f64 {
    (total_bytes as f64 * 8.0) / whole_secs as f64 / 1_000_000.0
}

/// Randomly filled payload, allocated once per transfer
///
/// Random content keeps any compression or deduplication on the path from
/// flattering the measurement.
struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    fn random(size: usize) -> Self {
        let mut bytes = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    /// The next chunk to offer, starting at `offset`
    ///
    /// Clamped to the bytes left, so a `chunk_size` larger than the payload
    /// offers the whole remainder at once.
    fn chunk(&self, offset: usize, chunk_size: usize) -> &[u8] {
        let end = offset.saturating_add(chunk_size).min(self.bytes.len());
        &self.bytes[offset..end]
    }
}

/// What a completed transfer observed
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub bytes_sent: usize,
    /// Send calls issued, equal to the number of RTT samples
    pub send_calls: u64,
    pub flow_completion: Duration,
    pub rtt_samples: usize,
    /// Includes the `(0, 0)` origin sample
    pub rate_samples: usize,
    pub rtt: RttSummary,
    /// Transport state at the final iteration
    pub last_info: TransportInfo,
}

impl TransferReport {
    /// Average goodput over the whole flow in megabits per second
    pub fn average_rate_mbps(&self) -> f64 {
        let secs = self.flow_completion.as_secs_f64();
        if secs > 0.0 {
            self.bytes_sent as f64 * 8.0 / secs / 1_000_000.0
        } else {
            0.0
        }
    }
}

/// Drives one bulk transfer over `S`
///
/// The sampler owns the stream for the duration of the run; `run` consumes
/// it, so a sampler cannot be reused for a second transfer.
pub struct TransferSampler<S: ProbedStream> {
    config: TransferConfig,
    stream: S,
}

impl<S: ProbedStream> TransferSampler<S> {
    /// Pair a validated configuration with an already connected stream
    ///
    /// `config.destination` and `config.congestion_control` are only used
    /// for logging here; connecting with them is the caller's job (see
    /// [`crate::transport::TcpProbe::connect`]).
    pub fn new(config: TransferConfig, stream: S) -> Self {
        Self { config, stream }
    }

    /// Run the transfer to completion, feeding `sinks`
    ///
    /// ## Parameters
    /// - `sinks`: Destinations for the sending-rate, RTT and flow completion
    ///   series; written in place so callers keep them after an error
    ///
    /// ## Returns
    /// - `Ok(TransferReport)`: the whole payload was accepted by the transport
    /// - `Err`: a send other than `EINTR` failed, a `TCP_INFO` query failed,
    ///   or a series could not be written. A [`TransportError`] can be
    ///   recovered with `downcast_ref`.
    ///
    /// The stream is closed and the sinks are flushed before returning `Ok`.
    /// On error the stream is dropped, which closes it, and nothing marks the
    /// series as complete.
    pub fn run<W: Write>(mut self, sinks: &mut TransferSinks<W>) -> Result<TransferReport> {
        let payload = Payload::random(self.config.payload_size);
        let mut rtt_collector = RttCollector::new()?;
        let mut rate = RateTracker::new();

        let mut total_sent = 0usize;
        let mut send_calls = 0u64;
        let mut last_info = TransportInfo::default();
        let mut flow_completion = None;

        info!(
            "Sending {} to {} using '{}' in {}-byte chunks",
            utils::format_bytes(payload.len()),
            self.config.destination,
            self.config.congestion_control,
            self.config.chunk_size
        );

        sinks
            .sending_rate
            .record(0.0, 0.0)
            .context("Failed to write sending-rate origin")?;

        let start = Instant::now();
        while total_sent < payload.len() {
            let chunk = payload.chunk(total_sent, self.config.chunk_size);
            let sent = match self.stream.send(chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(TransportError::Send {
                        sent: total_sent,
                        source,
                    }
                    .into())
                }
            };
            send_calls += 1;
            total_sent += sent;

            let elapsed = start.elapsed();
            let elapsed_secs = elapsed.as_secs_f64();

            let info = self.stream.transport_info()?;
            sinks
                .rtt
                .record(elapsed_secs, info.rtt_ms())
                .context("Failed to write RTT sample")?;
            rtt_collector.record_us(info.rtt_us)?;
            last_info = info;
            trace!(
                "send #{}: {} bytes, total {}, rtt {:.2}ms, cwnd {}",
                send_calls,
                sent,
                total_sent,
                info.rtt_ms(),
                info.snd_cwnd
            );

            if let Some(mbps) = rate.observe(elapsed, total_sent) {
                sinks
                    .sending_rate
                    .record(elapsed_secs, mbps)
                    .context("Failed to write sending-rate sample")?;
                debug!(
                    "{:.0}s: {} sent, {:.2} Mbps, rtt {:.2}ms, cwnd {}",
                    elapsed_secs,
                    utils::format_bytes(total_sent),
                    mbps,
                    info.rtt_ms(),
                    info.snd_cwnd
                );
            }

            if total_sent >= payload.len() {
                sinks
                    .flow_completion
                    .record(elapsed_secs)
                    .context("Failed to write flow completion time")?;
                flow_completion = Some(elapsed);
            }
        }
        drop(payload);

        self.stream.close()?;
        sinks.flush().context("Failed to flush metric series")?;

        let flow_completion =
            flow_completion.ok_or_else(|| anyhow!("Transfer ended without completing"))?;

        Ok(TransferReport {
            bytes_sent: total_sent,
            send_calls,
            flow_completion,
            rtt_samples: sinks.rtt.len(),
            rate_samples: sinks.sending_rate.len(),
            rtt: rtt_collector.summary(),
            last_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Scripted stream: each send accepts up to `accept` bytes unless a
    /// scripted error is queued for that call.
    struct MockStream {
        accept: usize,
        send_errors: VecDeque<Option<io::ErrorKind>>,
        rtt_us: u32,
        fail_info_after: Option<usize>,
        offered: Rc<RefCell<Vec<usize>>>,
        info_calls: Cell<usize>,
        /// Simulated time each send blocks for
        send_delay: Option<Duration>,
    }

    impl MockStream {
        fn new(accept: usize) -> Self {
            Self {
                accept,
                send_errors: VecDeque::new(),
                rtt_us: 1500,
                fail_info_after: None,
                offered: Rc::new(RefCell::new(Vec::new())),
                info_calls: Cell::new(0),
                send_delay: None,
            }
        }
    }

    impl ProbedStream for MockStream {
        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(Some(kind)) = self.send_errors.pop_front() {
                return Err(io::Error::new(kind, "scripted failure"));
            }
            self.offered.borrow_mut().push(buf.len());
            if let Some(delay) = self.send_delay {
                std::thread::sleep(delay);
            }
            Ok(buf.len().min(self.accept))
        }

        fn transport_info(&self) -> Result<TransportInfo, TransportError> {
            let calls = self.info_calls.get() + 1;
            self.info_calls.set(calls);
            if self.fail_info_after.map_or(false, |limit| calls > limit) {
                return Err(TransportError::Diagnostics(io::Error::from_raw_os_error(
                    libc::EBADF,
                )));
            }
            Ok(TransportInfo {
                rtt_us: self.rtt_us,
                snd_cwnd: 10,
                ..Default::default()
            })
        }
    }

    fn config(payload_size: usize, chunk_size: usize) -> TransferConfig {
        TransferConfig {
            congestion_control: "cubic".to_string(),
            destination: "127.0.0.1:1234".parse().unwrap(),
            payload_size,
            chunk_size,
        }
    }

    fn sinks() -> TransferSinks<Vec<u8>> {
        TransferSinks::new(Vec::new(), Vec::new(), Vec::new())
    }

    fn lines(bytes: &[u8]) -> Vec<String> {
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_four_full_chunks() {
        let mut sinks = sinks();
        let report = TransferSampler::new(config(4096, 1024), MockStream::new(1024))
            .run(&mut sinks)
            .unwrap();

        assert_eq!(report.bytes_sent, 4096);
        assert_eq!(report.send_calls, 4);
        assert_eq!(report.rtt_samples, 4);
        assert_eq!(report.rtt.samples, 4);

        let (rate, rtt, fct) = sinks.finish().unwrap();
        let rtt = lines(&rtt);
        assert_eq!(rtt.len(), 4);
        assert!(rtt.iter().all(|l| l.ends_with("\t1.50")));

        // Flow completion is the elapsed time of the last RTT sample.
        let fct = String::from_utf8(fct).unwrap();
        assert!(!fct.contains('\n'));
        let last_rtt_time = rtt[3].split('\t').next().unwrap();
        assert_eq!(fct, last_rtt_time);
        assert_eq!(
            format!("{:.6}", report.flow_completion.as_secs_f64()),
            fct
        );

        // A sub-second run only has the origin sample.
        assert_eq!(lines(&rate), vec!["0.000000\t0.00".to_string()]);
        assert_eq!(report.rate_samples, 1);
    }

    #[test]
    fn test_partial_sends_advance_by_actual_count() {
        let mut sinks = sinks();
        let stream = MockStream::new(300);
        let report = TransferSampler::new(config(4096, 1024), stream)
            .run(&mut sinks)
            .unwrap();

        // 4096 / 300 rounds up to 14 calls, the last one short.
        assert_eq!(report.bytes_sent, 4096);
        assert_eq!(report.send_calls, 14);
        assert_eq!(report.rtt_samples, 14);
    }

    #[test]
    fn test_last_chunk_is_truncated_to_remaining() {
        let stream = MockStream::new(usize::MAX);
        let offered = Rc::clone(&stream.offered);

        let mut sinks = sinks();
        let report = TransferSampler::new(config(2500, 1024), stream)
            .run(&mut sinks)
            .unwrap();

        assert_eq!(*offered.borrow(), vec![1024, 1024, 452]);
        assert_eq!(report.bytes_sent, 2500);
        assert_eq!(report.send_calls, 3);
    }

    #[test]
    fn test_chunk_larger_than_payload_sends_once() {
        let stream = MockStream::new(usize::MAX);
        let offered = Rc::clone(&stream.offered);

        let mut sinks = sinks();
        let report = TransferSampler::new(config(100, 1024), stream)
            .run(&mut sinks)
            .unwrap();

        assert_eq!(*offered.borrow(), vec![100]);
        assert_eq!(report.bytes_sent, 100);
        assert_eq!(report.send_calls, 1);
        assert!(sinks.flow_completion.is_recorded());
    }

    #[test]
    fn test_config_accepts_default_chunk_with_small_payload() {
        use clap::Parser;

        let args = ClientArgs::try_parse_from([
            "cc-client", "reno", "/tmp", "--host", "127.0.0.1", "-s", "500",
        ])
        .unwrap();
        let config = TransferConfig::from_args(&args).unwrap();
        assert_eq!(config.payload_size, 500);
        assert_eq!(config.chunk_size, 1024);

        let args = ClientArgs::try_parse_from([
            "cc-client", "reno", "/tmp", "--host", "127.0.0.1", "-c", "0",
        ])
        .unwrap();
        assert!(TransferConfig::from_args(&args).is_err());
    }

    #[test]
    fn test_rate_samples_across_whole_seconds() {
        const STEP: usize = 1_000_000;
        let mut stream = MockStream::new(STEP);
        stream.send_delay = Some(Duration::from_millis(300));

        let mut sinks = sinks();
        let report = TransferSampler::new(config(8 * STEP, STEP), stream)
            .run(&mut sinks)
            .unwrap();
        assert_eq!(report.send_calls, 8);

        let (rate, rtt, _) = sinks.finish().unwrap();
        let rtt = lines(&rtt);
        let rate = lines(&rate);
        assert_eq!(rate[0], "0.000000\t0.00");

        // Bytes sent as of each RTT timestamp; rate samples share those timestamps.
        let sent_at: Vec<(String, usize)> = rtt
            .iter()
            .enumerate()
            .map(|(i, line)| (line.split('\t').next().unwrap().to_string(), (i + 1) * STEP))
            .collect();

        let mut expected_seconds: Vec<u64> = sent_at
            .iter()
            .map(|(t, _)| t.parse::<f64>().unwrap().floor() as u64)
            .filter(|&s| s > 0)
            .collect();
        expected_seconds.dedup();
        // 8 sends of at least 300 ms each run past 2.4 s.
        assert!(expected_seconds.len() >= 2);
        assert_eq!(rate.len(), 1 + expected_seconds.len());
        assert_eq!(report.rate_samples, rate.len());

        let mut last_second = 0u64;
        for (line, &second) in rate[1..].iter().zip(&expected_seconds) {
            let (elapsed, value) = line.split_once('\t').unwrap();
            let whole = elapsed.parse::<f64>().unwrap().floor() as u64;
            assert_eq!(whole, second);
            assert!(whole > last_second);
            last_second = whole;

            let bytes = sent_at
                .iter()
                .find(|(t, _)| t == elapsed)
                .map(|(_, b)| *b)
                .expect("rate sample taken at an RTT timestamp");
            let expected = bytes as f64 * 8.0 / whole as f64 / 1_000_000.0;
            assert_eq!(value, format!("{:.2}", expected));
        }
    }

    #[test]
    fn test_send_error_is_fatal() {
        let mut stream = MockStream::new(1024);
        stream.send_errors = VecDeque::from(vec![None, Some(io::ErrorKind::BrokenPipe)]);

        let mut sinks = sinks();
        let err = TransferSampler::new(config(4096, 1024), stream)
            .run(&mut sinks)
            .unwrap_err();

        match err.downcast_ref::<TransportError>() {
            Some(TransportError::Send { sent, .. }) => assert_eq!(*sent, 1024),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!sinks.flow_completion.is_recorded());
        assert_eq!(sinks.rtt.len(), 1);
    }

    #[test]
    fn test_interrupted_send_is_reissued() {
        let mut stream = MockStream::new(1024);
        stream.send_errors = VecDeque::from(vec![Some(io::ErrorKind::Interrupted)]);

        let mut sinks = sinks();
        let report = TransferSampler::new(config(2048, 1024), stream)
            .run(&mut sinks)
            .unwrap();

        assert_eq!(report.send_calls, 2);
        assert_eq!(report.rtt_samples, 2);
    }

    #[test]
    fn test_diagnostic_failure_is_fatal() {
        let mut stream = MockStream::new(1024);
        stream.fail_info_after = Some(2);

        let mut sinks = sinks();
        let err = TransferSampler::new(config(8192, 1024), stream)
            .run(&mut sinks)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransportError>(),
            Some(TransportError::Diagnostics(_))
        ));
        assert_eq!(sinks.rtt.len(), 2);
        assert!(!sinks.flow_completion.is_recorded());
    }

    #[test]
    fn test_rate_tracker_whole_seconds() {
        let mut rate = RateTracker::new();
        assert_eq!(rate.observe(Duration::from_millis(999), 1_000_000), None);

        // 1 MB over 1 whole second = 8 Mbps
        assert_eq!(rate.observe(Duration::from_millis(1_000), 1_000_000), Some(8.0));
        assert_eq!(rate.observe(Duration::from_millis(1_700), 2_000_000), None);

        // The divisor is whole seconds, not the fractional elapsed time.
        assert_eq!(rate.observe(Duration::from_millis(2_900), 3_000_000), Some(12.0));
        assert_eq!(rate.observe(Duration::from_millis(2_950), 3_100_000), None);
    }

    #[test]
    fn test_rate_tracker_skipped_seconds() {
        let mut rate = RateTracker::new();
        // A send blocked across several seconds yields one sample, not one per second.
        assert_eq!(rate.observe(Duration::from_secs(4), 5_000_000), Some(10.0));
        assert_eq!(rate.observe(Duration::from_millis(4_500), 6_000_000), None);
        assert!(rate.observe(Duration::from_secs(5), 6_000_000).is_some());
    }

    #[test]
    fn test_sending_rate_mbps() {
        assert_eq!(sending_rate_mbps(125_000, 1), 1.0);
        assert!((sending_rate_mbps(120 * 1024 * 1024, 10) - 100.663296).abs() < 1e-9);
    }

    #[test]
    fn test_average_rate() {
        let report = TransferReport {
            bytes_sent: 1_000_000,
            send_calls: 1,
            flow_completion: Duration::from_secs(2),
            rtt_samples: 1,
            rate_samples: 1,
            rtt: RttSummary::default(),
            last_info: TransportInfo::default(),
        };
        assert_eq!(report.average_rate_mbps(), 4.0);
    }
}
