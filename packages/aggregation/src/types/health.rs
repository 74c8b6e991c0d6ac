use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome classification of the most recent health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Probe succeeded within the latency threshold
    Healthy,
    /// Probe succeeded but too slowly, or the rotation pool was exhausted
    Degraded,
    /// Probe failed
    Down,
}

/// Per-platform health snapshot. Recomputed on demand; not persisted
/// across restarts unless explicitly written to a cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub errors: Vec<String>,
}

impl HealthRecord {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            checked_at: Utc::now(),
            latency_ms,
            errors: Vec::new(),
        }
    }

    pub fn degraded(latency_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            checked_at: Utc::now(),
            latency_ms,
            errors: vec![reason.into()],
        }
    }

    pub fn down(latency_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Down,
            checked_at: Utc::now(),
            latency_ms,
            errors: vec![reason.into()],
        }
    }
}
