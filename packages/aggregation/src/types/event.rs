use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::platform::PlatformKey;

/// Adapter-specific response payload. Shape varies per platform; it is a
/// loosely-typed document validated strictly only at the normalization
/// boundary, never earlier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResult {
    pub platform: PlatformKey,
    pub payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

impl RawResult {
    pub fn new(platform: PlatformKey, payload: serde_json::Value) -> Self {
        Self {
            platform,
            payload,
            fetched_at: Utc::now(),
        }
    }
}

/// Canonical venue schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedVenue {
    pub name: String,
    pub city: Option<String>,
    pub capacity: Option<u32>,
}

/// Canonical price schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub currency: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub face_value: Option<f64>,
    pub tier: Option<String>,
}

/// Canonical event schema. Every RawResult either normalizes into exactly
/// one of these or is rejected with a normalization error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub venue: Option<NormalizedVenue>,
    pub platform: PlatformKey,
    pub source_url: String,
    pub price: Option<PriceRange>,
}

impl NormalizedEvent {
    /// Min price in integer cents, for stable ordering. Events without a
    /// price sort after priced ones.
    pub fn min_price_cents(&self) -> i64 {
        self.price
            .as_ref()
            .and_then(|p| p.min)
            .map(|m| (m * 100.0).round() as i64)
            .unwrap_or(i64::MAX)
    }
}
