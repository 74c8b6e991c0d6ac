//! URL classifier: which platform owns an arbitrary event URL?
//!
//! Pure function over the registry's declared URL patterns; no network
//! access. Longest (most specific) domain+path match wins; ties go to the
//! platform declared first in the registry.

use url::Url;

use crate::registry::PlatformRegistry;
use crate::types::platform::PlatformKey;

/// Return the platform owning `url`, or `None` for unclassified URLs.
/// Never fails, including on garbage input.
pub fn detect_platform(registry: &PlatformRegistry, url: &str) -> Option<PlatformKey> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let path = parsed.path();

    let mut best: Option<(usize, &PlatformKey)> = None;

    for descriptor in registry.list() {
        for pattern in &descriptor.url_patterns {
            if let Some(score) = pattern_score(pattern, &host, path) {
                // Strictly-greater keeps declaration order on ties.
                if best.map(|(s, _)| score > s).unwrap_or(true) {
                    best = Some((score, &descriptor.key));
                }
            }
        }
    }

    best.map(|(_, key)| key.clone())
}

/// Match a `domain[/path-prefix]` pattern against a host + path.
/// Returns a specificity score (pattern length) on match.
fn pattern_score(pattern: &str, host: &str, path: &str) -> Option<usize> {
    let pattern = pattern.trim().to_ascii_lowercase();
    let (domain, path_prefix) = match pattern.split_once('/') {
        Some((d, p)) => (d.to_string(), format!("/{p}")),
        None => (pattern.clone(), String::new()),
    };

    if domain.is_empty() {
        return None;
    }

    // Host must equal the domain or be a subdomain of it.
    let host_matches = host == domain || host.ends_with(&format!(".{domain}"));
    if !host_matches {
        return None;
    }

    if !path_prefix.is_empty() && !path.starts_with(&path_prefix) {
        return None;
    }

    Some(domain.len() + path_prefix.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::PlatformsConfig;

    fn registry() -> PlatformRegistry {
        let config = PlatformsConfig::from_json(
            r#"{
                "platforms": {
                    "ticketmaster": {
                        "base_url": "https://app.ticketmaster.com",
                        "adapter": "api",
                        "capabilities": ["search"],
                        "url_patterns": ["ticketmaster.com", "livenation.ticketmaster.com"]
                    },
                    "stubhub": {
                        "base_url": "https://www.stubhub.com",
                        "adapter": "api",
                        "capabilities": ["search"],
                        "url_patterns": ["stubhub.com"]
                    },
                    "manchester_united": {
                        "base_url": "https://www.manutd.com",
                        "adapter": "scrape",
                        "capabilities": ["search"],
                        "url_patterns": ["manutd.com/tickets", "manutd.com"],
                        "selectors": {
                            "event": ".fixture",
                            "title": ".fixture__title",
                            "date": "time",
                            "link": "a"
                        }
                    }
                }
            }"#,
        )
        .unwrap();
        PlatformRegistry::from_config(&config).unwrap()
    }

    #[test]
    fn test_classifies_known_platforms() {
        let registry = registry();
        assert_eq!(
            detect_platform(&registry, "https://www.ticketmaster.com/event/123"),
            Some(PlatformKey::from("ticketmaster"))
        );
        assert_eq!(
            detect_platform(&registry, "https://www.manutd.com/tickets/123"),
            Some(PlatformKey::from("manchester_united"))
        );
        assert_eq!(
            detect_platform(&registry, "https://unknownsite.test/x"),
            None
        );
    }

    #[test]
    fn test_most_specific_pattern_wins() {
        let registry = registry();
        // Both `manutd.com` and `manutd.com/tickets` match; the longer wins.
        assert_eq!(
            detect_platform(&registry, "https://manutd.com/tickets/home-games"),
            Some(PlatformKey::from("manchester_united"))
        );
        // Plain site pages still classify via the bare domain pattern.
        assert_eq!(
            detect_platform(&registry, "https://manutd.com/news"),
            Some(PlatformKey::from("manchester_united"))
        );
    }

    #[test]
    fn test_subdomain_matches() {
        let registry = registry();
        assert_eq!(
            detect_platform(&registry, "https://shop.stubhub.com/event/9"),
            Some(PlatformKey::from("stubhub"))
        );
    }

    #[test]
    fn test_never_fails_on_garbage() {
        let registry = registry();
        assert_eq!(detect_platform(&registry, ""), None);
        assert_eq!(detect_platform(&registry, "not a url"), None);
        assert_eq!(detect_platform(&registry, "ftp://ticketmaster.com/x"), Some(PlatformKey::from("ticketmaster")));
        assert_eq!(detect_platform(&registry, "https://"), None);
    }

    #[test]
    fn test_no_partial_domain_match() {
        let registry = registry();
        // `notstubhub.com` must not match the `stubhub.com` pattern.
        assert_eq!(
            detect_platform(&registry, "https://notstubhub.com/event/1"),
            None
        );
    }
}
