//! API-backed platform adapter.
//!
//! Issues authenticated REST calls against the platform's documented API.
//! Transport failures are retried with bounded exponential backoff; 4xx
//! auth rejections surface immediately and are never retried. Platforms
//! configured with `fallback_selectors` fall back to scraping when an API
//! search fails, the way the original StubHub integration did.

use serde_json::Value;
use std::sync::Arc;
use url::Url;

use super::scrape::ScrapeAdapter;
use super::{
    acquire_identity, backoff_delay, probe_base_url, status_error, transport_error,
    PlatformAdapter,
};
use crate::error::{PlatformError, Result};
use crate::rotation::{Identity, RotationService};
use crate::types::config::{PlatformSettings, SearchSettings};
use crate::types::event::RawResult;
use crate::types::platform::{Capability, PlatformDescriptor};

/// Known API request/response shapes. Resolved once from the platform key;
/// unknown API platforms get the generic shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiShape {
    Ticketmaster,
    Stubhub,
    Seatgeek,
    Eventbrite,
    Generic,
}

impl ApiShape {
    fn for_platform(key: &str) -> Self {
        match key {
            "ticketmaster" | "livenation" => Self::Ticketmaster,
            "stubhub" => Self::Stubhub,
            "seatgeek" => Self::Seatgeek,
            "eventbrite" => Self::Eventbrite,
            _ => Self::Generic,
        }
    }

    fn search_path(&self) -> &'static str {
        match self {
            Self::Ticketmaster => "discovery/v2/events.json",
            Self::Stubhub => "search/catalog/events",
            Self::Seatgeek => "2/events",
            Self::Eventbrite => "v3/events/search/",
            Self::Generic => "events",
        }
    }

    fn search_params(
        &self,
        query: &str,
        location: Option<&str>,
        limit: usize,
    ) -> Vec<(&'static str, String)> {
        let mut params = match self {
            Self::Ticketmaster => vec![("keyword", query.to_string()), ("size", limit.to_string())],
            Self::Stubhub => vec![("q", query.to_string()), ("rows", limit.to_string())],
            Self::Seatgeek => vec![("q", query.to_string()), ("per_page", limit.to_string())],
            Self::Eventbrite => vec![("q", query.to_string())],
            Self::Generic => vec![("q", query.to_string()), ("limit", limit.to_string())],
        };
        if let Some(location) = location {
            let param = match self {
                Self::Ticketmaster | Self::Stubhub => "city",
                Self::Seatgeek => "venue.city",
                Self::Eventbrite => "location.address",
                Self::Generic => "location",
            };
            params.push((param, location.to_string()));
        }
        params
    }

    fn event_path(&self, id: &str) -> String {
        match self {
            Self::Ticketmaster => format!("discovery/v2/events/{id}.json"),
            Self::Stubhub => format!("catalog/events/v3/{id}"),
            Self::Seatgeek => format!("2/events/{id}"),
            Self::Eventbrite => format!("v3/events/{id}/"),
            Self::Generic => format!("events/{id}"),
        }
    }

    fn venue_path(&self, id: &str) -> String {
        match self {
            Self::Ticketmaster => format!("discovery/v2/venues/{id}.json"),
            Self::Stubhub => format!("catalog/venues/v3/{id}"),
            Self::Seatgeek => format!("2/venues/{id}"),
            Self::Eventbrite => format!("v3/venues/{id}/"),
            Self::Generic => format!("venues/{id}"),
        }
    }

    /// JSON pointer to the item array in a search response.
    fn items_pointer(&self) -> &'static str {
        match self {
            Self::Ticketmaster => "/_embedded/events",
            _ => "/events",
        }
    }

    /// How the credential rides on the request.
    fn auth(&self) -> AuthStyle {
        match self {
            Self::Ticketmaster => AuthStyle::QueryParam("apikey"),
            Self::Seatgeek => AuthStyle::QueryParam("client_id"),
            Self::Stubhub | Self::Eventbrite | Self::Generic => AuthStyle::Bearer,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum AuthStyle {
    QueryParam(&'static str),
    Bearer,
}

pub struct ApiAdapter {
    descriptor: PlatformDescriptor,
    shape: ApiShape,
    client: reqwest::Client,
    api_key: Option<String>,
    rotation: Arc<RotationService>,
    max_retries: u32,
    fallback: Option<ScrapeAdapter>,
}

impl ApiAdapter {
    pub fn from_settings(
        descriptor: PlatformDescriptor,
        settings: &PlatformSettings,
        search: &SearchSettings,
        rotation: Arc<RotationService>,
        client: reqwest::Client,
    ) -> Result<Self> {
        let fallback = settings
            .fallback_selectors
            .as_ref()
            .map(|selectors| {
                ScrapeAdapter::new(
                    descriptor.clone(),
                    selectors,
                    search,
                    Arc::clone(&rotation),
                    client.clone(),
                )
            })
            .transpose()?;

        Ok(Self {
            shape: ApiShape::for_platform(descriptor.key.as_str()),
            descriptor,
            client,
            api_key: settings.api_key.clone(),
            rotation,
            max_retries: search.max_retries,
            fallback,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.descriptor.base_url.trim_end_matches('/').to_string();
        base.push('/');
        Url::parse(&base)
            .and_then(|b| b.join(path.trim_start_matches('/')))
            .map_err(|e| PlatformError::Config(format!("{}: bad endpoint: {e}", self.descriptor.key)))
    }

    /// One authenticated request, no retries.
    async fn send_once(&self, mut url: Url, identity: Option<&Identity>) -> Result<Value> {
        let key = &self.descriptor.key;
        let credential = identity
            .and_then(|i| i.api_key.clone())
            .or_else(|| self.api_key.clone());

        let mut request = self.client.get(url.clone());
        if let Some(credential) = credential {
            match self.shape.auth() {
                AuthStyle::QueryParam(name) => {
                    url.query_pairs_mut().append_pair(name, &credential);
                    request = self.client.get(url);
                }
                AuthStyle::Bearer => {
                    request = request.bearer_auth(credential);
                }
            }
        }
        if let Some(user_agent) = identity.and_then(|i| i.user_agent.as_deref()) {
            request = request.header(reqwest::header::USER_AGENT, user_agent);
        }

        let response = request.send().await.map_err(|e| transport_error(e, key))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, key));
        }

        response.json().await.map_err(|_| PlatformError::DataShape {
            platform: key.clone(),
            selector: "json response body".to_string(),
        })
    }

    /// Request with identity consumption, outcome recording, and bounded
    /// backoff on retryable transport failures.
    async fn request_json(&self, url: Url) -> Result<Value> {
        let key = &self.descriptor.key;
        let mut attempt = 0u32;
        loop {
            let identity = acquire_identity(&self.descriptor, &self.rotation)?;
            let result = self.send_once(url.clone(), identity.as_ref()).await;

            if let Some(identity) = &identity {
                self.rotation
                    .record_outcome(key, identity, result.is_ok());
            }

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        platform = %key,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after transport failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Pull the item array out of a search payload and wrap each entry.
fn extract_items(
    payload: &Value,
    pointer: &str,
    limit: usize,
    descriptor: &PlatformDescriptor,
) -> Vec<RawResult> {
    payload
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .take(limit)
                .map(|item| RawResult::new(descriptor.key.clone(), item.clone()))
                .collect()
        })
        // Absent item array means zero matches, not an error.
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl PlatformAdapter for ApiAdapter {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    async fn search_events(
        &self,
        query: &str,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RawResult>> {
        let mut url = self.endpoint(self.shape.search_path())?;
        for (name, value) in self.shape.search_params(query, location, limit) {
            url.query_pairs_mut().append_pair(name, &value);
        }

        let api_result = self.request_json(url).await;
        let payload = match (api_result, &self.fallback) {
            (Ok(payload), _) => payload,
            (Err(err), Some(fallback)) => {
                tracing::warn!(
                    platform = %self.descriptor.key,
                    error = %err,
                    "API search failed, falling back to scraping"
                );
                return fallback.search_events(query, location, limit).await;
            }
            (Err(err), None) => return Err(err),
        };

        let results = extract_items(&payload, self.shape.items_pointer(), limit, &self.descriptor);
        tracing::info!(
            platform = %self.descriptor.key,
            query = %query,
            results = results.len(),
            "API search completed"
        );
        Ok(results)
    }

    async fn get_event(&self, id: &str) -> Result<RawResult> {
        if !self.descriptor.has_capability(Capability::EventDetail) {
            return Err(PlatformError::NotFound(format!(
                "{} does not expose event detail",
                self.descriptor.key
            )));
        }
        let url = self.endpoint(&self.shape.event_path(id))?;
        let payload = self.request_json(url).await?;
        Ok(RawResult::new(self.descriptor.key.clone(), payload))
    }

    async fn get_venue(&self, id: &str) -> Result<RawResult> {
        if !self.descriptor.has_capability(Capability::VenueDetail) {
            return Err(PlatformError::NotFound(format!(
                "{} does not expose venue detail",
                self.descriptor.key
            )));
        }
        let url = self.endpoint(&self.shape.venue_path(id))?;
        let payload = self.request_json(url).await?;
        Ok(RawResult::new(self.descriptor.key.clone(), payload))
    }

    async fn probe(&self) -> Result<()> {
        probe_base_url(&self.client, &self.descriptor).await
    }
}
