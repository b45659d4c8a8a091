use crate::{metrics::RttSummary, sampler::TransferConfig, sampler::TransferReport};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Complete record of one transfer run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub congestion_control: String,
    pub destination: String,
    pub payload_size: usize,
    pub chunk_size: usize,
    pub bytes_sent: usize,
    pub send_calls: u64,
    pub flow_completion_secs: f64,
    pub average_rate_mbps: f64,
    pub rtt: RttSummary,
    /// Sender cwnd (segments) at the final iteration
    pub final_cwnd: u32,
    pub total_retransmissions: u32,
    pub system_info: SystemInfo,
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub harness_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            harness_version: crate::VERSION.to_string(),
        }
    }
}

impl RunSummary {
    pub fn new(config: &TransferConfig, report: &TransferReport) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            congestion_control: config.congestion_control.clone(),
            destination: config.destination.to_string(),
            payload_size: config.payload_size,
            chunk_size: config.chunk_size,
            bytes_sent: report.bytes_sent,
            send_calls: report.send_calls,
            flow_completion_secs: report.flow_completion.as_secs_f64(),
            average_rate_mbps: report.average_rate_mbps(),
            rtt: report.rtt.clone(),
            final_cwnd: report.last_info.snd_cwnd,
            total_retransmissions: report.last_info.total_retrans,
            system_info: SystemInfo::default(),
        }
    }

    /// Write the summary as pretty-printed JSON
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run summary {}", path.display()))?;
        info!("Run summary written to: {:?}", path);
        Ok(())
    }
}
