//! Platform registry: the validated, ordered catalog of descriptors.
//!
//! Built once at startup from configuration; fails fast on settings that
//! cannot produce a working adapter. Declaration order is preserved and
//! breaks ties in URL classification.

use crate::error::{PlatformError, Result};
use crate::types::config::PlatformsConfig;
use crate::types::platform::{PlatformDescriptor, PlatformKey};

pub struct PlatformRegistry {
    descriptors: Vec<PlatformDescriptor>,
}

impl PlatformRegistry {
    /// Build the catalog from validated configuration.
    pub fn from_config(config: &PlatformsConfig) -> Result<Self> {
        config.validate()?;

        let descriptors = config
            .platforms
            .iter()
            .map(|(key, settings)| PlatformDescriptor {
                key: PlatformKey::from(key.as_str()),
                display_name: settings
                    .display_name
                    .clone()
                    .unwrap_or_else(|| default_display_name(key)),
                base_url: settings.base_url.clone(),
                capabilities: settings.capabilities.clone(),
                enabled: settings.enabled,
                adapter: settings.adapter,
                url_patterns: settings.url_patterns.clone(),
                requires_rotation: settings.requires_rotation,
            })
            .collect::<Vec<_>>();

        tracing::info!(platforms = descriptors.len(), "Platform registry loaded");
        Ok(Self { descriptors })
    }

    /// All descriptors, in declaration order.
    pub fn list(&self) -> &[PlatformDescriptor] {
        &self.descriptors
    }

    /// Look up one platform by key.
    pub fn get(&self, key: &PlatformKey) -> Result<&PlatformDescriptor> {
        self.descriptors
            .iter()
            .find(|d| &d.key == key)
            .ok_or_else(|| PlatformError::NotFound(format!("platform {key}")))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// `manchester_united` -> `Manchester United`
fn default_display_name(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PlatformsConfig {
        PlatformsConfig::from_json(
            r#"{
                "platforms": {
                    "ticketmaster": {
                        "base_url": "https://app.ticketmaster.com",
                        "adapter": "api",
                        "capabilities": ["search", "event_detail", "venue_detail"]
                    },
                    "manchester_united": {
                        "base_url": "https://www.manutd.com",
                        "adapter": "scrape",
                        "capabilities": ["search"],
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
        .unwrap()
    }

    #[test]
    fn test_loads_in_declaration_order() {
        let registry = PlatformRegistry::from_config(&config()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list()[0].key.as_str(), "ticketmaster");
        assert_eq!(registry.list()[1].key.as_str(), "manchester_united");
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let registry = PlatformRegistry::from_config(&config()).unwrap();
        let err = registry.get(&PlatformKey::from("axs")).unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
    }

    #[test]
    fn test_default_display_name() {
        let registry = PlatformRegistry::from_config(&config()).unwrap();
        let mu = registry.get(&PlatformKey::from("manchester_united")).unwrap();
        assert_eq!(mu.display_name, "Manchester United");
    }
}
