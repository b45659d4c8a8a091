use anyhow::Result;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// RTT distribution over a transfer, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RttSummary {
    pub samples: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// RTT collector using HDR histogram
///
/// Values are recorded in microseconds, the unit `TCP_INFO` reports, so no
/// precision is lost before the summary converts to milliseconds.
pub struct RttCollector {
    histogram: Histogram<u64>,
}

impl RttCollector {
    /// Create a new RTT collector
    pub fn new() -> Result<Self> {
        // 3 significant figures, auto-resizing
        let histogram = Histogram::<u64>::new(3)?;
        Ok(Self { histogram })
    }

    /// Record one RTT sample in microseconds
    pub fn record_us(&mut self, rtt_us: u32) -> Result<()> {
        self.histogram.record(u64::from(rtt_us))?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    pub fn summary(&self) -> RttSummary {
        if self.is_empty() {
            return RttSummary::default();
        }

        let to_ms = |us: u64| us as f64 / 1000.0;
        RttSummary {
            samples: self.histogram.len(),
            min_ms: to_ms(self.histogram.min()),
            max_ms: to_ms(self.histogram.max()),
            mean_ms: self.histogram.mean() / 1000.0,
            p50_ms: to_ms(self.histogram.value_at_quantile(0.50)),
            p95_ms: to_ms(self.histogram.value_at_quantile(0.95)),
            p99_ms: to_ms(self.histogram.value_at_quantile(0.99)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_collector_summary() {
        let collector = RttCollector::new().unwrap();
        assert!(collector.is_empty());
        assert_eq!(collector.summary(), RttSummary::default());
    }

    #[test]
    fn test_rtt_summary() {
        let mut collector = RttCollector::new().unwrap();
        for rtt_us in [1_000u32, 2_000, 3_000, 4_000, 5_000] {
            collector.record_us(rtt_us).unwrap();
        }

        let summary = collector.summary();
        assert_eq!(summary.samples, 5);
        assert_eq!(summary.min_ms, 1.0);
        // HDR histograms with 3 significant figures are exact to within 0.1%.
        assert!((summary.max_ms - 5.0).abs() < 0.01);
        assert!((summary.mean_ms - 3.0).abs() < 0.01);
        assert!((summary.p50_ms - 3.0).abs() < 0.01);
        assert!(summary.p99_ms >= summary.p95_ms);
    }
}
