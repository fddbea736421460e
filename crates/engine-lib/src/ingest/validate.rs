//! Stateless range checks for raw samples

use crate::error::IngestError;
use crate::models::RawSample;

/// Check every numeric field of a sample. Ordering is checked later, under
/// the node's lock.
pub fn validate_sample(sample: &RawSample) -> Result<(), IngestError> {
    if sample.node_id.trim().is_empty() {
        return Err(IngestError::invalid("node_id", "must not be empty"));
    }

    non_negative("cpu_load", sample.cpu_load)?;
    non_negative("memory_used", sample.memory_used)?;
    non_negative("network_latency_ms", sample.network_latency_ms)?;
    non_negative("network_throughput", sample.network_throughput)?;

    finite("memory_total", sample.memory_total)?;
    if sample.memory_total <= 0.0 {
        return Err(IngestError::invalid("memory_total", "must be positive"));
    }
    if sample.memory_used > sample.memory_total {
        return Err(IngestError::invalid(
            "memory_used",
            format!(
                "{} exceeds memory_total {}",
                sample.memory_used, sample.memory_total
            ),
        ));
    }

    finite("heartbeat_success_rate", sample.heartbeat_success_rate)?;
    if !(0.0..=1.0).contains(&sample.heartbeat_success_rate) {
        return Err(IngestError::invalid(
            "heartbeat_success_rate",
            format!("{} is outside [0, 1]", sample.heartbeat_success_rate),
        ));
    }

    if let Some(ts) = sample.timestamp {
        if ts < 0 {
            return Err(IngestError::invalid("timestamp", "must not be negative"));
        }
    }

    Ok(())
}

fn finite(field: &'static str, value: f64) -> Result<(), IngestError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(IngestError::invalid(field, "must be a finite number"))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), IngestError> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(IngestError::invalid(field, format!("{} is negative", value)));
    }
    Ok(())
}
