//! Scraping-backed platform adapter.
//!
//! Issues HTTP GETs against HTML pages and extracts structured data via
//! CSS selectors. Used for platforms without a usable API (club sites,
//! smaller marketplaces). Selector misses are not retried (a layout
//! mismatch is not transient) and surface as `DataShapeError`. Requests
//! are paced and carry rotating browser user agents.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{
    acquire_identity, backoff_delay, looks_like_bot_challenge, probe_base_url, status_error,
    transport_error, PlatformAdapter, Pacer, DEFAULT_USER_AGENTS,
};
use crate::error::{PlatformError, Result};
use crate::rotation::{Identity, RotationService};
use crate::types::config::{PlatformSettings, SearchSettings, SelectorSet};
use crate::types::event::RawResult;
use crate::types::platform::{Capability, PlatformDescriptor};

/// Compiled selector set; invalid selectors fail at adapter construction.
struct CompiledSelectors {
    event: Selector,
    title: Selector,
    date: Selector,
    link: Selector,
    venue: Option<Selector>,
    price: Option<Selector>,
    raw: SelectorSet,
}

fn compile(platform: &PlatformDescriptor, set: &SelectorSet) -> Result<CompiledSelectors> {
    let parse = |css: &str| {
        Selector::parse(css).map_err(|e| {
            PlatformError::Config(format!("{}: bad selector {css:?}: {e}", platform.key))
        })
    };
    Ok(CompiledSelectors {
        event: parse(&set.event)?,
        title: parse(&set.title)?,
        date: parse(&set.date)?,
        link: parse(&set.link)?,
        venue: set.venue.as_deref().map(parse).transpose()?,
        price: set.price.as_deref().map(parse).transpose()?,
        raw: set.clone(),
    })
}

pub struct ScrapeAdapter {
    descriptor: PlatformDescriptor,
    selectors: CompiledSelectors,
    client: reqwest::Client,
    rotation: Arc<RotationService>,
    pacer: Pacer,
    max_retries: u32,
    request_count: AtomicUsize,
}

impl ScrapeAdapter {
    pub fn new(
        descriptor: PlatformDescriptor,
        selectors: &SelectorSet,
        search: &SearchSettings,
        rotation: Arc<RotationService>,
        client: reqwest::Client,
    ) -> Result<Self> {
        let selectors = compile(&descriptor, selectors)?;
        Ok(Self {
            descriptor,
            selectors,
            client,
            rotation,
            pacer: Pacer::new(Duration::from_millis(search.min_request_delay_ms)),
            max_retries: search.max_retries,
            request_count: AtomicUsize::new(0),
        })
    }

    pub fn from_settings(
        descriptor: PlatformDescriptor,
        settings: &PlatformSettings,
        search: &SearchSettings,
        rotation: Arc<RotationService>,
        client: reqwest::Client,
    ) -> Result<Self> {
        let selectors = settings.selectors.as_ref().ok_or_else(|| {
            PlatformError::Config(format!("scraping platform {} has no selectors", descriptor.key))
        })?;
        Self::new(descriptor, selectors, search, rotation, client)
    }

    fn user_agent(&self, identity: Option<&Identity>) -> String {
        if let Some(ua) = identity.and_then(|i| i.user_agent.as_deref()) {
            return ua.to_string();
        }
        let n = self.request_count.fetch_add(1, Ordering::Relaxed);
        DEFAULT_USER_AGENTS[n % DEFAULT_USER_AGENTS.len()].to_string()
    }

    /// One GET, no retries. Bot-challenge bodies count as a rejection so
    /// the identity that triggered them cools down hard.
    async fn fetch_once(&self, url: &Url, identity: Option<&Identity>) -> Result<String> {
        let key = &self.descriptor.key;

        // Per-identity proxies need their own client; reqwest proxies are
        // client-level, not request-level.
        let client = match identity.and_then(|i| i.proxy.as_deref()) {
            Some(proxy_url) => reqwest::Proxy::all(proxy_url)
                .and_then(|proxy| reqwest::Client::builder().proxy(proxy).build())
                .map_err(|e| PlatformError::Config(format!("{key}: proxy: {e}")))?,
            None => self.client.clone(),
        };

        let response = client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, self.user_agent(identity))
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| transport_error(e, key))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, key));
        }

        let body = response.text().await.map_err(|e| transport_error(e, key))?;
        if looks_like_bot_challenge(&body) {
            tracing::warn!(platform = %key, url = %url, "Bot challenge page detected");
            return Err(PlatformError::Auth {
                platform: key.clone(),
                message: "bot detection triggered".to_string(),
            });
        }
        Ok(body)
    }

    /// Paced fetch with identity consumption, outcome recording, and
    /// bounded retries on transport failures only.
    async fn fetch_html(&self, url: &Url) -> Result<String> {
        let key = &self.descriptor.key;
        let mut attempt = 0u32;
        loop {
            self.pacer.wait().await;
            let identity = acquire_identity(&self.descriptor, &self.rotation)?;
            let result = self.fetch_once(url, identity.as_ref()).await;

            if let Some(identity) = &identity {
                self.rotation.record_outcome(key, identity, result.is_ok());
            }

            match result {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        platform = %key,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying scrape after transport failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn search_url(&self, query: &str, location: Option<&str>) -> Result<Url> {
        let mut base = self.descriptor.base_url.trim_end_matches('/').to_string();
        base.push_str("/search");
        let mut url = Url::parse(&base)
            .map_err(|e| PlatformError::Config(format!("{}: bad base_url: {e}", self.descriptor.key)))?;
        url.query_pairs_mut().append_pair("q", query);
        if let Some(location) = location {
            url.query_pairs_mut().append_pair("location", location);
        }
        Ok(url)
    }

    fn event_url(&self, id: &str) -> Result<Url> {
        if id.starts_with("http://") || id.starts_with("https://") {
            return Url::parse(id)
                .map_err(|_| PlatformError::NotFound(format!("bad event URL: {id}")));
        }
        let base = self.descriptor.base_url.trim_end_matches('/');
        Url::parse(&format!("{base}/event/{id}"))
            .map_err(|e| PlatformError::Config(format!("{}: bad base_url: {e}", self.descriptor.key)))
    }
}

/// Extract search results from a results page. Zero event cards is zero
/// matches (empty vec); a card missing its title or link selector is a
/// layout change and rejects the page.
fn parse_search_results(
    html: &str,
    selectors: &CompiledSelectors,
    descriptor: &PlatformDescriptor,
    limit: usize,
) -> Result<Vec<RawResult>> {
    let document = Html::parse_document(html);
    let base = Url::parse(&descriptor.base_url).ok();
    let mut results = Vec::new();

    for card in document.select(&selectors.event).take(limit) {
        results.push(parse_event_card(&card, selectors, descriptor, base.as_ref())?);
    }

    Ok(results)
}

fn parse_event_card(
    card: &ElementRef<'_>,
    selectors: &CompiledSelectors,
    descriptor: &PlatformDescriptor,
    base: Option<&Url>,
) -> Result<RawResult> {
    let key = &descriptor.key;

    let title = card
        .select(&selectors.title)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| PlatformError::DataShape {
            platform: key.clone(),
            selector: selectors.raw.title.clone(),
        })?;

    let href = card
        .select(&selectors.link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .ok_or_else(|| PlatformError::DataShape {
            platform: key.clone(),
            selector: selectors.raw.link.clone(),
        })?;
    let url = resolve_href(base, href);

    let mut payload = json!({
        "title": title,
        "url": url,
    });

    if let Some(date_el) = card.select(&selectors.date).next() {
        let text = date_el
            .value()
            .attr("datetime")
            .map(str::to_string)
            .unwrap_or_else(|| element_text(date_el));
        if let Some(start) = parse_event_date(&text) {
            payload["start_time"] = json!(start.to_rfc3339());
        }
    }

    if let Some(venue_sel) = &selectors.venue {
        if let Some(venue) = card.select(venue_sel).next().map(element_text) {
            if !venue.is_empty() {
                payload["venue"] = json!(venue);
            }
        }
    }

    if let Some(price_sel) = &selectors.price {
        if let Some(price_text) = card.select(price_sel).next().map(element_text) {
            if let Some((amount, currency)) = parse_price(&price_text) {
                payload["price_min"] = json!(amount);
                payload["currency"] = json!(currency);
            }
        }
    }

    Ok(RawResult::new(key.clone(), payload))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn resolve_href(base: Option<&Url>, href: &str) -> String {
    match base {
        Some(base) => base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}

/// Parse the date formats club sites and marketplaces actually serve:
/// RFC 3339 `datetime` attributes, naive ISO timestamps, bare dates.
fn parse_event_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// `"From £58.50"` -> `(58.5, "GBP")`
fn parse_price(text: &str) -> Option<(f64, String)> {
    let currency = if text.contains('£') {
        "GBP"
    } else if text.contains('€') {
        "EUR"
    } else {
        "USD"
    };

    let number: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok().map(|amount| (amount, currency.to_string()))
}

#[async_trait::async_trait]
impl PlatformAdapter for ScrapeAdapter {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    async fn search_events(
        &self,
        query: &str,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RawResult>> {
        let url = self.search_url(query, location)?;
        let html = self.fetch_html(&url).await?;
        let results = parse_search_results(&html, &self.selectors, &self.descriptor, limit)?;
        tracing::info!(
            platform = %self.descriptor.key,
            query = %query,
            results = results.len(),
            "Scrape search completed"
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
        let url = self.event_url(id)?;
        let html = self.fetch_html(&url).await?;

        // A detail page is one event card at document level.
        let document = Html::parse_document(&html);
        let root = document.root_element();
        let base = Url::parse(&self.descriptor.base_url).ok();
        let mut raw = parse_event_card(&root, &self.selectors, &self.descriptor, base.as_ref())?;
        raw.payload["url"] = json!(url.to_string());
        Ok(raw)
    }

    async fn get_venue(&self, _id: &str) -> Result<RawResult> {
        // Venue detail pages have no stable scrapable shape across the
        // club sites this adapter targets.
        Err(PlatformError::NotFound(format!(
            "{} does not expose venue detail",
            self.descriptor.key
        )))
    }

    async fn probe(&self) -> Result<()> {
        probe_base_url(&self.client, &self.descriptor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::platform::{AdapterKind, PlatformKey};

    fn descriptor() -> PlatformDescriptor {
        PlatformDescriptor {
            key: PlatformKey::from("manchester_united"),
            display_name: "Manchester United".to_string(),
            base_url: "https://www.manutd.com".to_string(),
            capabilities: vec![Capability::Search, Capability::EventDetail],
            enabled: true,
            adapter: AdapterKind::Scrape,
            url_patterns: vec!["manutd.com".to_string()],
            requires_rotation: false,
        }
    }

    fn selectors() -> CompiledSelectors {
        compile(
            &descriptor(),
            &SelectorSet {
                event: ".fixture".to_string(),
                title: ".fixture__title".to_string(),
                date: "time".to_string(),
                link: "a".to_string(),
                venue: Some(".fixture__venue".to_string()),
                price: Some(".fixture__price".to_string()),
            },
        )
        .unwrap()
    }

    const FIXTURE_HTML: &str = r#"
        <html><body>
          <div class="fixture">
            <h3 class="fixture__title">Manchester United v Liverpool</h3>
            <time datetime="2026-11-21T15:00:00Z">21 Nov</time>
            <span class="fixture__venue">Old Trafford</span>
            <span class="fixture__price">From £58.50</span>
            <a href="/tickets/123">Buy</a>
          </div>
          <div class="fixture">
            <h3 class="fixture__title">Manchester United v Everton</h3>
            <time datetime="2026-12-05T12:30:00Z">5 Dec</time>
            <span class="fixture__venue">Old Trafford</span>
            <a href="https://www.manutd.com/tickets/124">Buy</a>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_search_results() {
        let results =
            parse_search_results(FIXTURE_HTML, &selectors(), &descriptor(), 50).unwrap();
        assert_eq!(results.len(), 2);

        let first = &results[0].payload;
        assert_eq!(first["title"], "Manchester United v Liverpool");
        assert_eq!(first["url"], "https://www.manutd.com/tickets/123");
        assert_eq!(first["venue"], "Old Trafford");
        assert_eq!(first["price_min"], 58.5);
        assert_eq!(first["currency"], "GBP");
        assert_eq!(first["start_time"], "2026-11-21T15:00:00+00:00");

        // Second card has no price element; the field is simply absent.
        assert!(results[1].payload.get("price_min").is_none());
    }

    #[test]
    fn test_limit_is_hard_cap() {
        let results = parse_search_results(FIXTURE_HTML, &selectors(), &descriptor(), 1).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_zero_cards_is_empty_not_error() {
        let html = "<html><body><h1>No results found</h1></body></html>";
        let results = parse_search_results(html, &selectors(), &descriptor(), 50).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_missing_title_selector_is_data_shape() {
        // Card exists but the title markup changed.
        let html = r#"<div class="fixture"><a href="/tickets/9">Buy</a></div>"#;
        let err = parse_search_results(html, &selectors(), &descriptor(), 50).unwrap_err();
        assert!(matches!(err, PlatformError::DataShape { .. }));
    }

    #[test]
    fn test_invalid_selector_fails_at_build() {
        let result = compile(
            &descriptor(),
            &SelectorSet {
                event: ":::not-a-selector".to_string(),
                title: "h3".to_string(),
                date: "time".to_string(),
                link: "a".to_string(),
                venue: None,
                price: None,
            },
        );
        assert!(matches!(result, Err(PlatformError::Config(_))));
    }

    #[test]
    fn test_parse_event_date_formats() {
        assert!(parse_event_date("2026-11-21T15:00:00Z").is_some());
        assert!(parse_event_date("2026-11-21T15:00:00").is_some());
        assert!(parse_event_date("2026-11-21").is_some());
        assert!(parse_event_date("Saturday 21 November").is_none());
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("From £58.50"), Some((58.5, "GBP".to_string())));
        assert_eq!(parse_price("$120"), Some((120.0, "USD".to_string())));
        assert_eq!(parse_price("€45.00 - €90.00"), Some((45.0, "EUR".to_string())));
        assert_eq!(parse_price("Sold out"), None);
    }
}
