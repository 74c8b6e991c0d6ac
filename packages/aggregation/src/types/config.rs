//! Startup configuration for the platform catalog.
//!
//! The config is a mapping of platform key to connection settings
//! (`api_key`, `secret`, `base_url`, ...) consumed once at process start.
//! Declaration order is preserved because it breaks classification ties.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::platform::{AdapterKind, Capability};
use crate::error::{PlatformError, Result};
use crate::rotation::Identity;

/// CSS selectors for a scraping-backed platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSet {
    /// Selector for one event card in a search results page
    pub event: String,
    /// Selector for the event title, relative to the card
    pub title: String,
    /// Selector for the event date, relative to the card. The `datetime`
    /// attribute is preferred over text content when present.
    pub date: String,
    /// Selector for the event link, relative to the card
    pub link: String,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
}

/// Connection settings for one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub adapter: AdapterKind,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub url_patterns: Vec<String>,
    #[serde(default)]
    pub requires_rotation: bool,
    /// Rotation pool for this platform; required when `requires_rotation`
    #[serde(default)]
    pub identities: Vec<Identity>,
    /// Required for scraping-backed platforms
    #[serde(default)]
    pub selectors: Option<SelectorSet>,
    /// Used as a scrape fallback when an API-backed search fails
    #[serde(default)]
    pub fallback_selectors: Option<SelectorSet>,
}

fn default_true() -> bool {
    true
}

/// Cooldown windows for the identity rotation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSettings {
    /// Cooldown stamped on every hand-out
    #[serde(default = "default_success_cooldown_ms")]
    pub success_cooldown_ms: u64,
    /// Cooldown applied when a call against the identity failed; longer,
    /// to back off faster from flagged identities
    #[serde(default = "default_failure_cooldown_ms")]
    pub failure_cooldown_ms: u64,
}

fn default_success_cooldown_ms() -> u64 {
    2_000
}

fn default_failure_cooldown_ms() -> u64 {
    30_000
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            success_cooldown_ms: default_success_cooldown_ms(),
            failure_cooldown_ms: default_failure_cooldown_ms(),
        }
    }
}

/// Tunables for aggregate search and health checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Per-platform deadline; one slow platform never delays the others
    #[serde(default = "default_per_platform_timeout_ms")]
    pub per_platform_timeout_ms: u64,
    /// Retry bound for transport failures at the adapter layer
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Minimum delay between requests on scraping adapters
    #[serde(default = "default_min_request_delay_ms")]
    pub min_request_delay_ms: u64,
    /// Probe latency above this is classified as degraded
    #[serde(default = "default_healthy_latency_ms")]
    pub healthy_latency_ms: u64,
}

fn default_per_platform_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_min_request_delay_ms() -> u64 {
    1_000
}

fn default_healthy_latency_ms() -> u64 {
    3_000
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            per_platform_timeout_ms: default_per_platform_timeout_ms(),
            max_retries: default_max_retries(),
            min_request_delay_ms: default_min_request_delay_ms(),
            healthy_latency_ms: default_healthy_latency_ms(),
        }
    }
}

/// Root configuration: the platform catalog plus rotation/search tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformsConfig {
    pub platforms: IndexMap<String, PlatformSettings>,
    #[serde(default)]
    pub rotation: RotationSettings,
    #[serde(default)]
    pub search: SearchSettings,
}

impl PlatformsConfig {
    /// Parse from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PlatformError::Config(e.to_string()))
    }

    /// Fail fast on settings that cannot produce a working adapter.
    pub fn validate(&self) -> Result<()> {
        for (key, settings) in &self.platforms {
            if settings.base_url.trim().is_empty() {
                return Err(PlatformError::Config(format!(
                    "platform {key} has no base_url"
                )));
            }
            url::Url::parse(&settings.base_url)
                .map_err(|e| PlatformError::Config(format!("platform {key} base_url: {e}")))?;
            if settings.capabilities.is_empty() {
                return Err(PlatformError::Config(format!(
                    "platform {key} declares no capabilities"
                )));
            }
            if settings.adapter == AdapterKind::Scrape && settings.selectors.is_none() {
                return Err(PlatformError::Config(format!(
                    "scraping platform {key} has no selectors"
                )));
            }
            // Venue pages have no scrapable shape; only API platforms can
            // honor the capability.
            if settings.adapter == AdapterKind::Scrape
                && settings.capabilities.contains(&Capability::VenueDetail)
            {
                return Err(PlatformError::Config(format!(
                    "scraping platform {key} cannot serve venue_detail"
                )));
            }
            if settings.requires_rotation && settings.identities.is_empty() {
                return Err(PlatformError::Config(format!(
                    "platform {key} requires rotation but has no identities"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config(base_url: &str, capabilities: &str) -> String {
        format!(
            r#"{{
                "platforms": {{
                    "ticketmaster": {{
                        "base_url": "{base_url}",
                        "adapter": "api",
                        "capabilities": {capabilities}
                    }}
                }}
            }}"#
        )
    }

    #[test]
    fn test_parse_minimal() {
        let config =
            PlatformsConfig::from_json(&minimal_config("https://app.ticketmaster.com", r#"["search"]"#))
                .unwrap();
        config.validate().unwrap();

        let tm = &config.platforms["ticketmaster"];
        assert!(tm.enabled);
        assert_eq!(tm.adapter, AdapterKind::Api);
        assert_eq!(config.rotation.success_cooldown_ms, 2_000);
        assert_eq!(config.search.max_retries, 2);
    }

    #[test]
    fn test_validate_rejects_empty_base_url() {
        let config = PlatformsConfig::from_json(&minimal_config("", r#"["search"]"#)).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_no_capabilities() {
        let config =
            PlatformsConfig::from_json(&minimal_config("https://app.ticketmaster.com", "[]"))
                .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_scrape_with_venue_detail() {
        let json = r#"{
            "platforms": {
                "manchester_united": {
                    "base_url": "https://www.manutd.com",
                    "adapter": "scrape",
                    "capabilities": ["search", "venue_detail"],
                    "selectors": {
                        "event": ".fixture",
                        "title": ".fixture__title",
                        "date": "time",
                        "link": "a"
                    }
                }
            }
        }"#;
        let config = PlatformsConfig::from_json(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(PlatformError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_scrape_without_selectors() {
        let json = r#"{
            "platforms": {
                "manchester_united": {
                    "base_url": "https://www.manutd.com",
                    "adapter": "scrape",
                    "capabilities": ["search"]
                }
            }
        }"#;
        let config = PlatformsConfig::from_json(json).unwrap();
        assert!(config.validate().is_err());
    }
}
