//! Generic key-value cache contract.
//!
//! The core does not own a persistence format; health snapshots (and any
//! other soft state) go through this get/put/forget contract and may be
//! cleared or expire at any time.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::error::Result;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Store a value, optionally expiring after `ttl`.
    async fn put(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<()>;

    async fn forget(&self, key: &str) -> Result<()>;
}

/// In-memory cache for testing and single-process deployments.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (serde_json::Value, Option<Instant>)>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.get(key).and_then(|(value, expires)| {
            let expired = expires.map(|at| at <= Instant::now()).unwrap_or(false);
            if expired {
                None
            } else {
                Some(value.clone())
            }
        }))
    }

    async fn put(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<()> {
        let expires = ttl.map(|d| Instant::now() + d);
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_forget() {
        let cache = MemoryCache::new();
        cache
            .put("health:stubhub", json!({"status": "healthy"}), None)
            .await
            .unwrap();

        let value = cache.get("health:stubhub").await.unwrap().unwrap();
        assert_eq!(value["status"], "healthy");

        cache.forget("health:stubhub").await.unwrap();
        assert!(cache.get("health:stubhub").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::new();
        cache
            .put("k", json!(1), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
