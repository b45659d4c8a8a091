//! Formatting and validation helpers shared by the binaries.
//!
//! ```rust
//! use tcp_cc_bench::utils::*;
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
//! assert_eq!(format_bytes(2621440), "2.50 MB");
//!
//! validate_chunk_size(1024)?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use std::time::Duration;

/// Longest algorithm name the kernel accepts, including the terminating NUL
pub const TCP_CA_NAME_MAX: usize = 16;

/// Format a byte count with binary units
///
/// ```rust
/// # use tcp_cc_bench::utils::format_bytes;
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: usize) -> String {
    let bytes = bytes as f64;
    if bytes < 1024.0 {
        format!("{:.0} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a duration, picking the unit from its magnitude
///
/// Durations of a minute or more use a compound form (`5m 30s`, `2h 15m 30s`).
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Format a rate in megabits per second
pub fn format_mbps(mbps: f64) -> String {
    format!("{:.2} Mbit/s", mbps)
}

/// Reject names the kernel could never resolve
///
/// Whether the algorithm is actually available is only known once the socket
/// option is applied.
pub fn validate_congestion_control(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("Congestion-control algorithm name cannot be empty");
    }
    if name.len() >= TCP_CA_NAME_MAX {
        anyhow::bail!(
            "Congestion-control algorithm name '{}' is too long (maximum {} bytes)",
            name,
            TCP_CA_NAME_MAX - 1
        );
    }
    if name.bytes().any(|b| b == 0 || b.is_ascii_whitespace()) {
        anyhow::bail!(
            "Congestion-control algorithm name '{}' contains invalid characters",
            name.escape_debug()
        );
    }
    Ok(())
}

pub fn validate_payload_size(payload_size: usize) -> Result<()> {
    if payload_size == 0 {
        anyhow::bail!("Payload size cannot be zero");
    }
    Ok(())
}

/// Validate the per-call send size
///
/// A chunk larger than the payload is fine: each call offers
/// `min(chunk_size, remaining)` bytes, so the whole payload then goes out
/// in a single offer.
pub fn validate_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 {
        anyhow::bail!("Chunk size cannot be zero");
    }
    Ok(())
}

pub fn validate_buffer_size(buffer_size: usize) -> Result<()> {
    if buffer_size == 0 {
        anyhow::bail!("Buffer size cannot be zero");
    }
    if buffer_size > 1024 * 1024 * 1024 {
        anyhow::bail!("Buffer size {} is too large (maximum 1GB)", buffer_size);
    }
    Ok(())
}
