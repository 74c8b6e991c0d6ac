use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a ticketing platform (e.g. `ticketmaster`, `stubhub`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformKey(pub String);

impl PlatformKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlatformKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PlatformKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What a platform adapter can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Search,
    EventDetail,
    VenueDetail,
}

/// How a platform is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Authenticated REST API
    Api,
    /// HTTP GET against HTML pages, extracted via CSS selectors
    Scrape,
}

/// Static catalog entry for one platform. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    pub key: PlatformKey,
    pub display_name: String,
    pub base_url: String,
    pub capabilities: Vec<Capability>,
    pub enabled: bool,
    pub adapter: AdapterKind,
    /// Domain (and optional path prefix) patterns owned by this platform,
    /// e.g. `ticketmaster.com` or `manutd.com/tickets`. Used by the URL
    /// classifier; most specific match wins.
    pub url_patterns: Vec<String>,
    /// Whether every outbound call must consume a rotation identity.
    pub requires_rotation: bool,
}

impl PlatformDescriptor {
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }
}
