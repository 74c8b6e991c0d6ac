//! Multi-Platform Ticket Aggregation Library
//!
//! Searches many ticket platforms behind one uniform contract: a platform
//! catalog built from startup configuration, API- and scraping-backed
//! adapters, identity rotation with cooldowns, a strict normalization
//! boundary, and a manager that fans a query out to every enabled
//! platform concurrently.
//!
//! # Usage
//!
//! ```rust,ignore
//! use aggregation::{MultiPlatformManager, PlatformsConfig};
//!
//! let config = PlatformsConfig::from_json(&std::fs::read_to_string("platforms.json")?)?;
//! let manager = MultiPlatformManager::from_config(&config)?;
//!
//! let result = manager.search_events_across_platforms("arsenal", None, 20).await;
//! for event in &result.events {
//!     println!("{} on {} ({})", event.title, event.start_time, event.platform);
//! }
//! ```
//!
//! # Modules
//!
//! - [`types`] - Platform catalog, event, health, and config types
//! - [`registry`] - Platform catalog built from configuration
//! - [`classifier`] - URL-to-platform detection
//! - [`rotation`] - Identity pools with hand-out and failure cooldowns
//! - [`adapters`] - API and scraping adapters behind one trait
//! - [`normalize`] - Raw payloads into the canonical event shape
//! - [`manager`] - Concurrent fan-out search, health, and statistics
//! - [`testing`] - Mock adapter for exercising the pipeline offline

pub mod adapters;
pub mod cache;
pub mod classifier;
pub mod error;
pub mod manager;
pub mod normalize;
pub mod registry;
pub mod rotation;
pub mod testing;
pub mod types;

pub use adapters::{ApiAdapter, PlatformAdapter, ScrapeAdapter};
pub use cache::{Cache, MemoryCache};
pub use classifier::detect_platform;
pub use error::{PlatformError, Result};
pub use manager::{AggregateResult, AggregateStatistics, MultiPlatformManager, PlatformStatus};
pub use normalize::{CanonicalField, MappingTable, Normalizer, Transform};
pub use registry::PlatformRegistry;
pub use rotation::{Identity, RotationService};
pub use types::config::{PlatformsConfig, RotationSettings, SearchSettings, SelectorSet};
pub use types::event::{NormalizedEvent, NormalizedVenue, PriceRange, RawResult};
pub use types::health::{HealthRecord, HealthStatus};
pub use types::platform::{AdapterKind, Capability, PlatformDescriptor, PlatformKey};
