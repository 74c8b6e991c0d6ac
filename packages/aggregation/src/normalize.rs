//! Data normalization service.
//!
//! Maps each adapter's raw response shape into the canonical
//! event/venue/price schema through declarative per-platform field-mapping
//! tables: JSON-pointer source path -> canonical field, with an optional
//! transform for date/price/currency conversion. Unknown fields are
//! dropped. A raw result missing any required canonical field (title,
//! start time, source URL) is rejected whole rather than emitted
//! partially populated.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{PlatformError, Result};
use crate::types::event::{NormalizedEvent, NormalizedVenue, PriceRange, RawResult};
use crate::types::platform::PlatformKey;

/// Canonical destination of a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalField {
    EventId,
    Title,
    StartTime,
    SourceUrl,
    VenueName,
    VenueCity,
    VenueCapacity,
    PriceCurrency,
    PriceMin,
    PriceMax,
    PriceFace,
    PriceTier,
}

/// Value conversion applied after extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// `2024-05-01T19:00:00Z` style timestamps
    DateRfc3339,
    /// `2024-05-01T19:00:00` with no offset, interpreted as UTC
    DateNaive,
    /// Integer seconds since the epoch
    DateUnixSeconds,
    /// Integer milliseconds since the epoch
    DateUnixMillis,
    /// Integer minor units -> major units (1999 -> 19.99)
    CentsToUnits,
    /// `usd` -> `USD`
    UppercaseCurrency,
}

/// One source-path -> canonical-field mapping.
#[derive(Debug, Clone)]
pub struct FieldMap {
    /// JSON pointer into the raw payload, e.g. `/dates/start/dateTime`
    pub source: String,
    pub target: CanonicalField,
    pub transform: Option<Transform>,
}

/// Declarative mapping table for one platform.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    fields: Vec<FieldMap>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, source: &str, target: CanonicalField) -> Self {
        self.fields.push(FieldMap {
            source: source.to_string(),
            target,
            transform: None,
        });
        self
    }

    pub fn map_with(mut self, source: &str, target: CanonicalField, transform: Transform) -> Self {
        self.fields.push(FieldMap {
            source: source.to_string(),
            target,
            transform: Some(transform),
        });
        self
    }
}

/// Field accumulator while walking a mapping table.
#[derive(Debug, Default)]
struct EventDraft {
    id: Option<String>,
    title: Option<String>,
    start_time: Option<DateTime<Utc>>,
    source_url: Option<String>,
    venue_name: Option<String>,
    venue_city: Option<String>,
    venue_capacity: Option<u32>,
    currency: Option<String>,
    price_min: Option<f64>,
    price_max: Option<f64>,
    price_face: Option<f64>,
    price_tier: Option<String>,
}

/// Normalization service: per-platform mapping tables, applied strictly.
pub struct Normalizer {
    tables: HashMap<PlatformKey, MappingTable>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Register (or replace) the mapping table for a platform.
    pub fn with_table(mut self, platform: PlatformKey, table: MappingTable) -> Self {
        self.tables.insert(platform, table);
        self
    }

    pub fn has_table(&self, platform: &PlatformKey) -> bool {
        self.tables.contains_key(platform)
    }

    /// Map a raw result into exactly one canonical event, or reject it.
    pub fn normalize(&self, raw: &RawResult) -> Result<NormalizedEvent> {
        let table = self.tables.get(&raw.platform).ok_or_else(|| {
            PlatformError::Normalization {
                platform: raw.platform.clone(),
                field: "mapping table".to_string(),
            }
        })?;

        let mut draft = EventDraft::default();
        for field in &table.fields {
            let Some(value) = raw.payload.pointer(&field.source) else {
                continue;
            };
            apply_field(&mut draft, field, value);
        }

        let title = require(&raw.platform, draft.title.take(), "title")?;
        let start_time = require(&raw.platform, draft.start_time.take(), "start time")?;
        let source_url = require(&raw.platform, draft.source_url.take(), "source URL")?;

        let venue = draft.venue_name.take().map(|name| NormalizedVenue {
            name,
            city: draft.venue_city.take(),
            capacity: draft.venue_capacity.take(),
        });

        let has_price = draft.price_min.is_some()
            || draft.price_max.is_some()
            || draft.price_face.is_some()
            || draft.price_tier.is_some();
        let price = has_price.then(|| PriceRange {
            currency: draft.currency.take().unwrap_or_else(|| "USD".to_string()),
            min: draft.price_min,
            max: draft.price_max,
            face_value: draft.price_face,
            tier: draft.price_tier.take(),
        });

        Ok(NormalizedEvent {
            id: draft
                .id
                .take()
                .unwrap_or_else(|| uuid::Uuid::now_v7().to_string()),
            title,
            start_time,
            venue,
            platform: raw.platform.clone(),
            source_url,
            price,
        })
    }
}

fn require<T>(platform: &PlatformKey, value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| PlatformError::Normalization {
        platform: platform.clone(),
        field: field.to_string(),
    })
}

// A mapping whose pointer resolves but whose conversion fails must not
// clobber a value an earlier mapping already produced: only assign on a
// successful conversion.
fn apply_field(draft: &mut EventDraft, field: &FieldMap, value: &Value) {
    match field.target {
        CanonicalField::EventId => assign(&mut draft.id, as_text(value)),
        CanonicalField::Title => assign(&mut draft.title, as_text(value)),
        CanonicalField::StartTime => {
            assign(&mut draft.start_time, as_datetime(value, field.transform));
        }
        CanonicalField::SourceUrl => assign(&mut draft.source_url, as_text(value)),
        CanonicalField::VenueName => assign(&mut draft.venue_name, as_text(value)),
        CanonicalField::VenueCity => assign(&mut draft.venue_city, as_text(value)),
        CanonicalField::VenueCapacity => {
            assign(&mut draft.venue_capacity, value.as_u64().map(|c| c as u32));
        }
        CanonicalField::PriceCurrency => {
            let currency = as_text(value).map(|c| {
                if field.transform == Some(Transform::UppercaseCurrency) {
                    c.to_uppercase()
                } else {
                    c
                }
            });
            assign(&mut draft.currency, currency);
        }
        CanonicalField::PriceMin => assign(&mut draft.price_min, as_money(value, field.transform)),
        CanonicalField::PriceMax => assign(&mut draft.price_max, as_money(value, field.transform)),
        CanonicalField::PriceFace => {
            assign(&mut draft.price_face, as_money(value, field.transform));
        }
        CanonicalField::PriceTier => assign(&mut draft.price_tier, as_text(value)),
    }
}

fn assign<T>(slot: &mut Option<T>, converted: Option<T>) {
    if converted.is_some() {
        *slot = converted;
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_money(value: &Value, transform: Option<Transform>) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches(['$', '£', '€']).parse().ok(),
        _ => None,
    }?;
    match transform {
        Some(Transform::CentsToUnits) => Some(amount / 100.0),
        _ => Some(amount),
    }
}

fn as_datetime(value: &Value, transform: Option<Transform>) -> Option<DateTime<Utc>> {
    match transform.unwrap_or(Transform::DateRfc3339) {
        Transform::DateRfc3339 => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        Transform::DateNaive => value
            .as_str()
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
            .map(|naive| Utc.from_utc_datetime(&naive)),
        Transform::DateUnixSeconds => value
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Transform::DateUnixMillis => value.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Built-in mapping table for a platform, when one ships with the library.
pub fn builtin_table(platform: &PlatformKey) -> Option<MappingTable> {
    use CanonicalField::*;
    match platform.as_str() {
        "ticketmaster" | "livenation" => Some(
            MappingTable::new()
                .map("/id", EventId)
                .map("/name", Title)
                .map_with("/dates/start/dateTime", StartTime, Transform::DateRfc3339)
                .map("/url", SourceUrl)
                .map("/_embedded/venues/0/name", VenueName)
                .map("/_embedded/venues/0/city/name", VenueCity)
                .map("/priceRanges/0/currency", PriceCurrency)
                .map("/priceRanges/0/min", PriceMin)
                .map("/priceRanges/0/max", PriceMax),
        ),
        "stubhub" => Some(
            MappingTable::new()
                .map("/id", EventId)
                .map("/name", Title)
                .map_with("/eventDateUTC", StartTime, Transform::DateRfc3339)
                .map("/webURI", SourceUrl)
                .map("/venue/name", VenueName)
                .map("/venue/city", VenueCity)
                .map_with("/ticketInfo/currencyCode", PriceCurrency, Transform::UppercaseCurrency)
                .map("/ticketInfo/minListPrice", PriceMin)
                .map("/ticketInfo/maxListPrice", PriceMax),
        ),
        "seatgeek" => Some(
            MappingTable::new()
                .map("/id", EventId)
                .map("/title", Title)
                .map_with("/datetime_utc", StartTime, Transform::DateNaive)
                .map("/url", SourceUrl)
                .map("/venue/name", VenueName)
                .map("/venue/city", VenueCity)
                .map("/venue/capacity", VenueCapacity)
                .map("/stats/lowest_price", PriceMin)
                .map("/stats/highest_price", PriceMax),
        ),
        "eventbrite" => Some(
            MappingTable::new()
                .map("/id", EventId)
                .map("/name/text", Title)
                .map_with("/start/utc", StartTime, Transform::DateRfc3339)
                .map("/url", SourceUrl)
                .map("/venue/name", VenueName)
                .map("/venue/address/city", VenueCity),
        ),
        _ => None,
    }
}

/// Table for the flat documents produced by scraping adapters.
pub fn scrape_table() -> MappingTable {
    use CanonicalField::*;
    MappingTable::new()
        .map("/id", EventId)
        .map("/title", Title)
        .map_with("/start_time", StartTime, Transform::DateRfc3339)
        .map("/url", SourceUrl)
        .map("/venue", VenueName)
        .map("/currency", PriceCurrency)
        .map("/price_min", PriceMin)
        .map("/price_max", PriceMax)
        .map("/tier", PriceTier)
}

/// Table for API platforms without a shipped mapping. Accepts the common
/// field spellings; later mappings win when both are present.
pub fn generic_table() -> MappingTable {
    use CanonicalField::*;
    scrape_table()
        .map("/name", Title)
        .map_with("/datetime", StartTime, Transform::DateRfc3339)
        .map("/link", SourceUrl)
        .map("/venue/name", VenueName)
        .map("/venue/city", VenueCity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer() -> Normalizer {
        let tm = PlatformKey::from("ticketmaster");
        let sg = PlatformKey::from("seatgeek");
        Normalizer::new()
            .with_table(tm.clone(), builtin_table(&tm).unwrap())
            .with_table(sg.clone(), builtin_table(&sg).unwrap())
    }

    #[test]
    fn test_ticketmaster_fixture_normalizes() {
        let raw = RawResult::new(
            PlatformKey::from("ticketmaster"),
            json!({
                "id": "vvG1iZ9pxbnS",
                "name": "Manchester United vs Arsenal",
                "url": "https://www.ticketmaster.com/event/vvG1iZ9pxbnS",
                "dates": {"start": {"dateTime": "2026-09-12T16:30:00Z"}},
                "_embedded": {"venues": [{"name": "Old Trafford", "city": {"name": "Manchester"}}]},
                "priceRanges": [{"currency": "GBP", "min": 45.0, "max": 220.0}],
                "promoter": {"id": "ignored-unknown-field"}
            }),
        );

        let event = normalizer().normalize(&raw).unwrap();
        assert_eq!(event.id, "vvG1iZ9pxbnS");
        assert_eq!(event.title, "Manchester United vs Arsenal");
        assert_eq!(event.venue.as_ref().unwrap().name, "Old Trafford");
        assert_eq!(event.venue.as_ref().unwrap().city.as_deref(), Some("Manchester"));
        let price = event.price.unwrap();
        assert_eq!(price.currency, "GBP");
        assert_eq!(price.min, Some(45.0));
    }

    #[test]
    fn test_seatgeek_naive_datetime_and_numeric_id() {
        let raw = RawResult::new(
            PlatformKey::from("seatgeek"),
            json!({
                "id": 5837561,
                "title": "Arsenal at Chelsea",
                "datetime_utc": "2026-10-03T14:00:00",
                "url": "https://seatgeek.com/arsenal-at-chelsea-tickets/5837561",
                "venue": {"name": "Stamford Bridge", "city": "London", "capacity": 40341},
                "stats": {"lowest_price": 120, "highest_price": 900}
            }),
        );

        let event = normalizer().normalize(&raw).unwrap();
        assert_eq!(event.id, "5837561");
        assert_eq!(event.start_time.to_rfc3339(), "2026-10-03T14:00:00+00:00");
        assert_eq!(event.venue.as_ref().unwrap().capacity, Some(40341));
        // No currency in the payload; defaulted.
        assert_eq!(event.price.unwrap().currency, "USD");
    }

    #[test]
    fn test_missing_title_rejects_whole_result() {
        let raw = RawResult::new(
            PlatformKey::from("ticketmaster"),
            json!({
                "id": "x",
                "url": "https://www.ticketmaster.com/event/x",
                "dates": {"start": {"dateTime": "2026-09-12T16:30:00Z"}}
            }),
        );

        let err = normalizer().normalize(&raw).unwrap_err();
        match err {
            PlatformError::Normalization { field, .. } => assert_eq!(field, "title"),
            other => panic!("expected normalization error, got {other}"),
        }
    }

    #[test]
    fn test_missing_start_time_rejects_whole_result() {
        let raw = RawResult::new(
            PlatformKey::from("ticketmaster"),
            json!({
                "name": "Some Event",
                "url": "https://www.ticketmaster.com/event/x",
                "dates": {"start": {"dateTime": "not a date"}}
            }),
        );

        assert!(matches!(
            normalizer().normalize(&raw),
            Err(PlatformError::Normalization { .. })
        ));
    }

    #[test]
    fn test_unregistered_platform_rejects() {
        let raw = RawResult::new(PlatformKey::from("axs"), json!({}));
        assert!(matches!(
            normalizer().normalize(&raw),
            Err(PlatformError::Normalization { .. })
        ));
    }

    #[test]
    fn test_scrape_table_round_trip() {
        let mu = PlatformKey::from("manchester_united");
        let normalizer = Normalizer::new().with_table(mu.clone(), scrape_table());
        let raw = RawResult::new(
            mu,
            json!({
                "title": "Manchester United v Liverpool",
                "start_time": "2026-11-21T15:00:00Z",
                "url": "https://www.manutd.com/tickets/123",
                "venue": "Old Trafford",
                "currency": "GBP",
                "price_min": "58.50"
            }),
        );

        let event = normalizer.normalize(&raw).unwrap();
        assert_eq!(event.price.unwrap().min, Some(58.5));
        assert!(!event.id.is_empty(), "id synthesized when source has none");
    }

    #[test]
    fn test_unconvertible_later_mapping_keeps_earlier_value() {
        // generic_table maps /title then /name; an object-valued "name"
        // must not wipe out the title already extracted.
        let key = PlatformKey::from("funzone");
        let normalizer = Normalizer::new().with_table(key.clone(), generic_table());
        let raw = RawResult::new(
            key,
            json!({
                "title": "Good Event",
                "start_time": "2026-10-03T14:00:00Z",
                "url": "https://funzone.test/events/1",
                "name": {"text": "Good Event"}
            }),
        );

        let event = normalizer.normalize(&raw).unwrap();
        assert_eq!(event.title, "Good Event");
    }

    #[test]
    fn test_later_convertible_mapping_wins() {
        let key = PlatformKey::from("funzone");
        let normalizer = Normalizer::new().with_table(key.clone(), generic_table());
        let raw = RawResult::new(
            key,
            json!({
                "title": "Scraped Title",
                "name": "API Title",
                "start_time": "2026-10-03T14:00:00Z",
                "url": "https://funzone.test/events/1"
            }),
        );

        let event = normalizer.normalize(&raw).unwrap();
        assert_eq!(event.title, "API Title");
    }

    #[test]
    fn test_cents_transform() {
        let key = PlatformKey::from("custom");
        let table = MappingTable::new()
            .map("/title", CanonicalField::Title)
            .map_with("/when", CanonicalField::StartTime, Transform::DateUnixSeconds)
            .map("/link", CanonicalField::SourceUrl)
            .map_with("/price_cents", CanonicalField::PriceMin, Transform::CentsToUnits);
        let normalizer = Normalizer::new().with_table(key.clone(), table);

        let raw = RawResult::new(
            key,
            json!({"title": "T", "when": 1767225600, "link": "https://x.test/1", "price_cents": 1999}),
        );
        let event = normalizer.normalize(&raw).unwrap();
        assert_eq!(event.price.unwrap().min, Some(19.99));
    }
}
