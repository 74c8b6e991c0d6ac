pub mod config;
pub mod event;
pub mod health;
pub mod platform;

pub use config::{PlatformSettings, PlatformsConfig, RotationSettings, SearchSettings, SelectorSet};
pub use event::{NormalizedEvent, NormalizedVenue, PriceRange, RawResult};
pub use health::{HealthRecord, HealthStatus};
pub use platform::{AdapterKind, Capability, PlatformDescriptor, PlatformKey};
