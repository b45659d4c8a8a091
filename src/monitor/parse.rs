//! Grammar of the tracking module's kernel log lines.
//!
//! ```text
//! [<float_timestamp>] <int_metric_id> <int_value> [<more fields>...]
//! ```
//!
//! Fields after the bracket are separated by spaces or tabs. `dmesg` pads the
//! timestamp inside the brackets (`[   12.345678]`), so whitespace there is
//! allowed.

use thiserror::Error;

/// A metric line that matched the wanted identifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricRecord {
    pub timestamp: f64,
    pub metric_id: i64,
    pub value: i64,
}

/// Why a line carrying the wanted identifier could not be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),

    #[error("missing value field")]
    MissingValue,

    #[error("invalid value '{0}'")]
    Value(String),
}

/// Split `[ts] rest` into the raw timestamp text and the remainder
fn split_header(line: &str) -> Option<(&str, &str)> {
    let inner = line.trim_start().strip_prefix('[')?;
    let close = inner.find(']')?;
    Some((inner[..close].trim(), &inner[close + 1..]))
}

/// Parse `line`, keeping it only if its metric identifier equals `wanted`
///
/// Returns `Ok(None)` for every line that is not a `wanted` metric line,
/// including ordinary kernel messages with no numeric identifier. Only lines
/// that do carry `wanted` but whose timestamp or value is unusable are
/// errors.
pub fn parse_metric_line(line: &str, wanted: i64) -> Result<Option<MetricRecord>, LineError> {
    let (timestamp, rest) = match split_header(line) {
        Some(parts) => parts,
        None => return Ok(None),
    };

    let mut fields = rest.split_whitespace();
    let metric_id = match fields.next().and_then(|f| f.parse::<i64>().ok()) {
        Some(id) if id == wanted => id,
        _ => return Ok(None),
    };

    let timestamp = timestamp
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| LineError::Timestamp(timestamp.to_string()))?;

    let raw_value = fields.next().ok_or(LineError::MissingValue)?;
    let value = raw_value
        .parse::<i64>()
        .map_err(|_| LineError::Value(raw_value.to_string()))?;

    Ok(Some(MetricRecord {
        timestamp,
        metric_id,
        value,
    }))
}
