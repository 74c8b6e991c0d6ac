//! Per-platform adapters behind one uniform capability contract.
//!
//! Two variants exist: API-backed ([`ApiAdapter`]) and scraping-backed
//! ([`ScrapeAdapter`]). Adapters are built once at startup by an explicit
//! constructor registry keyed on the configured adapter kind, no
//! reflection or runtime class lookup.

pub mod api;
pub mod scrape;

pub use api::ApiAdapter;
pub use scrape::ScrapeAdapter;

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{PlatformError, Result};
use crate::registry::PlatformRegistry;
use crate::rotation::{Identity, RotationService};
use crate::types::config::PlatformsConfig;
use crate::types::event::RawResult;
use crate::types::platform::{AdapterKind, PlatformDescriptor, PlatformKey};

/// Uniform capability contract implemented by every platform adapter.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn descriptor(&self) -> &PlatformDescriptor;

    /// Configured base URL, for diagnostics.
    fn base_url(&self) -> &str {
        &self.descriptor().base_url
    }

    /// Search events. Zero matches is an empty collection, never an error.
    /// `limit` is a hard cap applied after adapter-native paging.
    async fn search_events(
        &self,
        query: &str,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RawResult>>;

    async fn get_event(&self, id: &str) -> Result<RawResult>;

    async fn get_venue(&self, id: &str) -> Result<RawResult>;

    /// Cheap reachability probe for health checks.
    async fn probe(&self) -> Result<()>;
}

/// Build one adapter per configured platform, resolved once at startup.
pub fn build_adapters(
    config: &PlatformsConfig,
    registry: &PlatformRegistry,
    rotation: Arc<RotationService>,
    client: reqwest::Client,
) -> Result<Vec<Arc<dyn PlatformAdapter>>> {
    let mut adapters: Vec<Arc<dyn PlatformAdapter>> = Vec::with_capacity(registry.len());

    for descriptor in registry.list() {
        let settings = config
            .platforms
            .get(descriptor.key.as_str())
            .ok_or_else(|| PlatformError::NotFound(format!("platform {}", descriptor.key)))?;

        let adapter: Arc<dyn PlatformAdapter> = match descriptor.adapter {
            AdapterKind::Api => Arc::new(ApiAdapter::from_settings(
                descriptor.clone(),
                settings,
                &config.search,
                Arc::clone(&rotation),
                client.clone(),
            )?),
            AdapterKind::Scrape => Arc::new(ScrapeAdapter::from_settings(
                descriptor.clone(),
                settings,
                &config.search,
                Arc::clone(&rotation),
                client.clone(),
            )?),
        };

        tracing::debug!(
            platform = %descriptor.key,
            adapter = ?descriptor.adapter,
            "Adapter built"
        );
        adapters.push(adapter);
    }

    Ok(adapters)
}

/// Browser user agents cycled on scraping requests when the identity does
/// not carry its own.
pub(crate) const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Markers that indicate the platform served a bot-detection page instead
/// of content. Treated like a credential rejection so the identity that
/// triggered it goes into the long cooldown.
const BOT_DETECTION_MARKERS: &[&str] = &[
    "captcha",
    "access denied",
    "are you a robot",
    "pardon our interruption",
    "unusual traffic",
];

pub(crate) fn looks_like_bot_challenge(body: &str) -> bool {
    let lowered = body.to_lowercase();
    BOT_DETECTION_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Enforces a minimum delay between outbound requests for one platform.
/// Each waiter reserves the next slot under the lock, so concurrent calls
/// queue up instead of bursting.
pub(crate) struct Pacer {
    min_delay: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub(crate) fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            next_slot: Mutex::new(None),
        }
    }

    pub(crate) async fn wait(&self) {
        if self.min_delay.is_zero() {
            return;
        }
        let slot = {
            let mut next = self.next_slot.lock().unwrap();
            let now = Instant::now();
            let slot = next.map(|at| at.max(now)).unwrap_or(now);
            *next = Some(slot + self.min_delay);
            slot
        };
        let now = Instant::now();
        if slot > now {
            tokio::time::sleep(slot - now).await;
        }
    }
}

/// Exponential backoff delay for retry attempt `attempt` (0-based).
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(250 * 2u64.pow(attempt.min(6)))
}

/// Pull the next identity for a platform when rotation is required.
pub(crate) fn acquire_identity(
    descriptor: &PlatformDescriptor,
    rotation: &RotationService,
) -> Result<Option<Identity>> {
    if descriptor.requires_rotation {
        rotation.next_identity(&descriptor.key).map(Some)
    } else {
        Ok(None)
    }
}

/// Map an HTTP status to the adapter error vocabulary.
pub(crate) fn status_error(status: reqwest::StatusCode, platform: &PlatformKey) -> PlatformError {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        PlatformError::Auth {
            platform: platform.clone(),
            message: format!("HTTP {status}"),
        }
    } else if status == reqwest::StatusCode::NOT_FOUND {
        PlatformError::NotFound(format!("{platform}: HTTP 404"))
    } else {
        // 429, 5xx, and anything else unexpected are transport-level.
        PlatformError::Transport {
            platform: platform.clone(),
            message: format!("HTTP {status}"),
        }
    }
}

pub(crate) fn transport_error(err: reqwest::Error, platform: &PlatformKey) -> PlatformError {
    PlatformError::Transport {
        platform: platform.clone(),
        message: err.to_string(),
    }
}

/// GET the platform's base URL; network reachability counts as healthy
/// even when the landing page answers with a 4xx.
pub(crate) async fn probe_base_url(
    client: &reqwest::Client,
    descriptor: &PlatformDescriptor,
) -> Result<()> {
    let response = client
        .get(&descriptor.base_url)
        .send()
        .await
        .map_err(|e| transport_error(e, &descriptor.key))?;

    if response.status().is_server_error() {
        return Err(status_error(response.status(), &descriptor.key));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_challenge_markers() {
        assert!(looks_like_bot_challenge("<html>Please solve this CAPTCHA</html>"));
        assert!(looks_like_bot_challenge("Access Denied - request blocked"));
        assert!(!looks_like_bot_challenge("<html><h1>Upcoming events</h1></html>"));
    }

    #[test]
    fn test_backoff_is_exponential_and_bounded() {
        assert_eq!(backoff_delay(0), Duration::from_millis(250));
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(20), backoff_delay(6));
    }

    #[tokio::test]
    async fn test_pacer_spaces_requests() {
        let pacer = Pacer::new(Duration::from_millis(50));
        let start = Instant::now();
        pacer.wait().await;
        pacer.wait().await;
        pacer.wait().await;
        assert!(
            start.elapsed() >= Duration::from_millis(100),
            "three paced requests should span two delays"
        );
    }

    #[tokio::test]
    async fn test_pacer_zero_delay_is_noop() {
        let pacer = Pacer::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..10 {
            pacer.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}
