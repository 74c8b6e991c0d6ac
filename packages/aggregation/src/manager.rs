//! Multi-platform manager: fan-out search, health, and status aggregation.
//!
//! Owns the adapter collection and the normalization service. Aggregate
//! search dispatches one independent, individually-cancellable task per
//! enabled platform; per-platform failures become entries in the result's
//! error map and never abort the other platforms.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::adapters::{build_adapters, PlatformAdapter};
use crate::cache::Cache;
use crate::error::{PlatformError, Result};
use crate::normalize::{builtin_table, generic_table, scrape_table, Normalizer};
use crate::registry::PlatformRegistry;
use crate::rotation::RotationService;
use crate::types::config::{PlatformsConfig, SearchSettings};
use crate::types::event::NormalizedEvent;
use crate::types::health::{HealthRecord, HealthStatus};
use crate::types::platform::{AdapterKind, Capability, PlatformKey};

/// Outcome of an aggregate search: everything that succeeded plus the
/// per-platform failures, never a total failure.
#[derive(Debug)]
pub struct AggregateResult {
    /// Merged, ranked events from all succeeding platforms
    pub events: Vec<NormalizedEvent>,
    /// Per-platform failures, isolated from each other
    pub errors: BTreeMap<PlatformKey, PlatformError>,
    /// Raw results rejected at the normalization boundary, per platform
    pub rejected: BTreeMap<PlatformKey, usize>,
    /// How many platforms were dispatched to
    pub platforms_searched: usize,
}

/// Capability/status summary for one platform.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlatformStatus {
    pub display_name: String,
    pub enabled: bool,
    pub adapter: AdapterKind,
    pub capabilities: Vec<Capability>,
    pub identities_available: Option<usize>,
    pub identity_pool_size: Option<usize>,
    pub last_health: Option<HealthStatus>,
}

/// Counts across the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AggregateStatistics {
    pub total_platforms: usize,
    pub enabled_platforms: usize,
    pub search_capable: usize,
    pub event_detail_capable: usize,
    pub venue_detail_capable: usize,
    pub api_backed: usize,
    pub scrape_backed: usize,
}

pub struct MultiPlatformManager {
    registry: Arc<PlatformRegistry>,
    adapters: HashMap<PlatformKey, Arc<dyn PlatformAdapter>>,
    rotation: Arc<RotationService>,
    normalizer: Arc<Normalizer>,
    health: RwLock<HashMap<PlatformKey, HealthRecord>>,
    cache: Option<Arc<dyn Cache>>,
    settings: SearchSettings,
}

impl MultiPlatformManager {
    /// Build the whole stack from startup configuration: registry,
    /// rotation pools, adapters, and normalization tables.
    pub fn from_config(config: &PlatformsConfig) -> Result<Self> {
        let registry = Arc::new(PlatformRegistry::from_config(config)?);

        let rotation = Arc::new(RotationService::new(
            Duration::from_millis(config.rotation.success_cooldown_ms),
            Duration::from_millis(config.rotation.failure_cooldown_ms),
        ));
        for (key, settings) in &config.platforms {
            if !settings.identities.is_empty() {
                rotation.register_pool(PlatformKey::from(key.as_str()), settings.identities.clone());
            }
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.search.per_platform_timeout_ms))
            .build()
            .map_err(|e| PlatformError::Config(format!("http client: {e}")))?;

        let adapters = build_adapters(config, &registry, Arc::clone(&rotation), client)?;

        let mut normalizer = Normalizer::new();
        for descriptor in registry.list() {
            let table = builtin_table(&descriptor.key).unwrap_or_else(|| match descriptor.adapter {
                AdapterKind::Scrape => scrape_table(),
                AdapterKind::Api => generic_table(),
            });
            normalizer = normalizer.with_table(descriptor.key.clone(), table);
        }

        Ok(Self::assemble(
            registry,
            adapters,
            rotation,
            Arc::new(normalizer),
            config.search.clone(),
        ))
    }

    /// Assemble from already-built parts. Used by tests and by callers
    /// that inject custom adapters.
    pub fn assemble(
        registry: Arc<PlatformRegistry>,
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        rotation: Arc<RotationService>,
        normalizer: Arc<Normalizer>,
        settings: SearchSettings,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|a| (a.descriptor().key.clone(), a))
            .collect();
        Self {
            registry,
            adapters,
            rotation,
            normalizer,
            health: RwLock::new(HashMap::new()),
            cache: None,
            settings,
        }
    }

    /// Attach an external cache for health snapshots.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn rotation(&self) -> &RotationService {
        &self.rotation
    }

    /// The adapter for one platform, for single-platform operations.
    pub fn get_client(&self, key: &PlatformKey) -> Result<Arc<dyn PlatformAdapter>> {
        self.adapters
            .get(key)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("platform {key}")))
    }

    /// Which platform owns an event URL, if any.
    pub fn detect_platform(&self, url: &str) -> Option<PlatformKey> {
        crate::classifier::detect_platform(&self.registry, url)
    }

    /// Reset a platform's rotation cooldowns immediately.
    pub fn clear_rotation_cache(&self, key: &PlatformKey) {
        self.rotation.clear(key);
    }

    /// Fan out a search to every enabled platform concurrently.
    ///
    /// Each platform runs under its own deadline; a slow or hanging
    /// platform contributes an error entry instead of delaying the rest.
    /// Merged events are ranked by a stable total order: exact keyword
    /// match in the title first, then earlier start time, then ascending
    /// min price, then platform key.
    pub async fn search_events_across_platforms(
        &self,
        query: &str,
        location: Option<&str>,
        limit_per_platform: usize,
    ) -> AggregateResult {
        let deadline = Duration::from_millis(self.settings.per_platform_timeout_ms);

        let mut handles = Vec::new();
        for descriptor in self.registry.list() {
            if !descriptor.enabled {
                continue;
            }
            let Some(adapter) = self.adapters.get(&descriptor.key) else {
                continue;
            };
            let adapter = Arc::clone(adapter);
            let key = descriptor.key.clone();
            let query = query.to_string();
            let location = location.map(str::to_string);

            handles.push(tokio::spawn(async move {
                let result = tokio::time::timeout(
                    deadline,
                    adapter.search_events(&query, location.as_deref(), limit_per_platform),
                )
                .await;
                (key, result)
            }));
        }

        let platforms_searched = handles.len();
        let mut events = Vec::new();
        let mut errors = BTreeMap::new();
        let mut rejected = BTreeMap::new();

        for handle in futures::future::join_all(handles).await {
            let (key, result) = match handle {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    tracing::error!(error = %join_err, "Search task panicked");
                    continue;
                }
            };

            let raw_results = match result {
                Ok(Ok(raw)) => raw,
                Ok(Err(err)) => {
                    tracing::warn!(platform = %key, error = %err, "Platform search failed");
                    errors.insert(key, err);
                    continue;
                }
                Err(_elapsed) => {
                    tracing::warn!(
                        platform = %key,
                        timeout_ms = deadline.as_millis() as u64,
                        "Platform search timed out"
                    );
                    errors.insert(
                        key.clone(),
                        PlatformError::Transport {
                            platform: key,
                            message: format!("timed out after {}ms", deadline.as_millis()),
                        },
                    );
                    continue;
                }
            };

            for raw in &raw_results {
                match self.normalizer.normalize(raw) {
                    Ok(event) => events.push(event),
                    Err(err) => {
                        tracing::warn!(platform = %key, error = %err, "Raw result rejected");
                        *rejected.entry(key.clone()).or_insert(0) += 1;
                    }
                }
            }
        }

        rank_events(&mut events, query);

        tracing::info!(
            query = %query,
            platforms = platforms_searched,
            events = events.len(),
            failures = errors.len(),
            "Aggregate search completed"
        );

        AggregateResult {
            events,
            errors,
            rejected,
            platforms_searched,
        }
    }

    /// Probe every enabled platform concurrently and classify each one.
    /// Health records tolerate concurrent updates; last write wins.
    pub async fn perform_health_check(&self) -> BTreeMap<PlatformKey, HealthRecord> {
        let deadline = Duration::from_millis(self.settings.per_platform_timeout_ms);
        let healthy_latency = self.settings.healthy_latency_ms;

        let mut handles = Vec::new();
        for descriptor in self.registry.list() {
            if !descriptor.enabled {
                continue;
            }
            let Some(adapter) = self.adapters.get(&descriptor.key) else {
                continue;
            };
            let adapter = Arc::clone(adapter);
            let key = descriptor.key.clone();

            handles.push(tokio::spawn(async move {
                let start = Instant::now();
                let outcome = tokio::time::timeout(deadline, adapter.probe()).await;
                let latency_ms = start.elapsed().as_millis() as u64;

                let record = match outcome {
                    Ok(Ok(())) if latency_ms <= healthy_latency => HealthRecord::healthy(latency_ms),
                    Ok(Ok(())) => HealthRecord::degraded(
                        latency_ms,
                        format!("probe latency {latency_ms}ms over threshold"),
                    ),
                    Ok(Err(PlatformError::Exhausted(platform))) => HealthRecord::degraded(
                        latency_ms,
                        format!("identity pool exhausted for {platform}"),
                    ),
                    Ok(Err(err)) => HealthRecord::down(latency_ms, err.to_string()),
                    Err(_elapsed) => HealthRecord::down(latency_ms, "probe timed out"),
                };
                (key, record)
            }));
        }

        let mut records = BTreeMap::new();
        for handle in futures::future::join_all(handles).await {
            if let Ok((key, record)) = handle {
                records.insert(key, record);
            }
        }

        {
            let mut health = self.health.write().unwrap();
            for (key, record) in &records {
                health.insert(key.clone(), record.clone());
            }
        }

        if let Some(cache) = &self.cache {
            for (key, record) in &records {
                if let Ok(value) = serde_json::to_value(record) {
                    let _ = cache
                        .put(
                            &format!("health:{key}"),
                            value,
                            Some(Duration::from_secs(60)),
                        )
                        .await;
                }
            }
        }

        records
    }

    /// Per-platform capability/status summaries, in declaration order.
    pub fn platforms_status(&self) -> BTreeMap<PlatformKey, PlatformStatus> {
        let health = self.health.read().unwrap();
        self.registry
            .list()
            .iter()
            .map(|d| {
                (
                    d.key.clone(),
                    PlatformStatus {
                        display_name: d.display_name.clone(),
                        enabled: d.enabled,
                        adapter: d.adapter,
                        capabilities: d.capabilities.clone(),
                        identities_available: self.rotation.available_count(&d.key),
                        identity_pool_size: self.rotation.pool_size(&d.key),
                        last_health: health.get(&d.key).map(|r| r.status),
                    },
                )
            })
            .collect()
    }

    /// Counts of platforms and capabilities across the catalog.
    pub fn aggregated_statistics(&self) -> AggregateStatistics {
        let descriptors = self.registry.list();
        let with = |cap: Capability| descriptors.iter().filter(|d| d.has_capability(cap)).count();
        AggregateStatistics {
            total_platforms: descriptors.len(),
            enabled_platforms: descriptors.iter().filter(|d| d.enabled).count(),
            search_capable: with(Capability::Search),
            event_detail_capable: with(Capability::EventDetail),
            venue_detail_capable: with(Capability::VenueDetail),
            api_backed: descriptors
                .iter()
                .filter(|d| d.adapter == AdapterKind::Api)
                .count(),
            scrape_backed: descriptors
                .iter()
                .filter(|d| d.adapter == AdapterKind::Scrape)
                .count(),
        }
    }

    /// Display names for every configured platform.
    pub fn display_names(&self) -> BTreeMap<PlatformKey, String> {
        self.registry
            .list()
            .iter()
            .map(|d| (d.key.clone(), d.display_name.clone()))
            .collect()
    }
}

/// Stable total order over merged events: exact keyword hit in the title
/// first, then earlier start time, then ascending min price, then
/// platform key as the final tiebreak.
fn rank_events(events: &mut [NormalizedEvent], query: &str) {
    let query_lower = query.to_lowercase();
    events.sort_by(|a, b| {
        let a_hit = a.title.to_lowercase().contains(&query_lower);
        let b_hit = b.title.to_lowercase().contains(&query_lower);
        b_hit
            .cmp(&a_hit)
            .then_with(|| a.start_time.cmp(&b.start_time))
            .then_with(|| a.min_price_cents().cmp(&b.min_price_cents()))
            .then_with(|| a.platform.cmp(&b.platform))
    });
}
