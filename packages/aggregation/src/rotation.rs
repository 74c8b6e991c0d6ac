//! Identity rotation service.
//!
//! Maintains a per-platform pool of credential/user-agent/proxy tuples and
//! hands out the next usable one on each outbound call. Every hand-out
//! stamps a cooldown on the identity; a recorded failure extends it, so
//! flagged identities rest longer before cycling back in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{PlatformError, Result};
use crate::types::platform::PlatformKey;

/// One credential/user-agent/proxy tuple usable for a single platform.
///
/// Loaded at startup; never deleted, only cycled through cooldowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Stable label identifying this identity within its pool
    pub label: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Identity {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            api_key: None,
            secret: None,
            user_agent: None,
            proxy: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

struct Slot {
    identity: Identity,
    cooldown_until: Option<Instant>,
}

struct PoolState {
    slots: Vec<Slot>,
    cursor: usize,
}

/// Lock-guarded rotation state for all platforms.
///
/// Explicitly injected (shared via `Arc`), never a process-wide singleton.
/// Two concurrent callers for the same platform can never receive the same
/// non-cooled identity: the hand-out cooldown is stamped under the lock.
pub struct RotationService {
    success_cooldown: Duration,
    failure_cooldown: Duration,
    pools: Mutex<HashMap<PlatformKey, PoolState>>,
}

impl RotationService {
    pub fn new(success_cooldown: Duration, failure_cooldown: Duration) -> Self {
        Self {
            success_cooldown,
            failure_cooldown,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Load a platform's identity pool. Replaces any previous pool.
    pub fn register_pool(&self, platform: PlatformKey, identities: Vec<Identity>) {
        let slots = identities
            .into_iter()
            .map(|identity| Slot {
                identity,
                cooldown_until: None,
            })
            .collect();
        self.pools.lock().unwrap().insert(
            platform,
            PoolState { slots, cursor: 0 },
        );
    }

    /// Hand out the next identity not currently in cooldown, round-robin
    /// from the cursor. The hand-out itself starts the success cooldown.
    pub fn next_identity(&self, platform: &PlatformKey) -> Result<Identity> {
        let mut pools = self.pools.lock().unwrap();
        let pool = pools
            .get_mut(platform)
            .ok_or_else(|| PlatformError::NotFound(format!("no identity pool for {platform}")))?;

        if pool.slots.is_empty() {
            return Err(PlatformError::Exhausted(platform.clone()));
        }

        let now = Instant::now();
        let len = pool.slots.len();
        for offset in 0..len {
            let idx = (pool.cursor + offset) % len;
            let cooling = pool.slots[idx]
                .cooldown_until
                .map(|until| until > now)
                .unwrap_or(false);
            if cooling {
                continue;
            }

            pool.slots[idx].cooldown_until = Some(now + self.success_cooldown);
            pool.cursor = (idx + 1) % len;

            let identity = pool.slots[idx].identity.clone();
            tracing::debug!(
                platform = %platform,
                identity = %identity.label,
                "Identity handed out"
            );
            return Ok(identity);
        }

        tracing::warn!(platform = %platform, pool_size = len, "Identity pool exhausted");
        Err(PlatformError::Exhausted(platform.clone()))
    }

    /// Record the outcome of a call made with an identity. Failures extend
    /// the cooldown to the failure window.
    pub fn record_outcome(&self, platform: &PlatformKey, identity: &Identity, success: bool) {
        if success {
            return;
        }

        let mut pools = self.pools.lock().unwrap();
        let Some(pool) = pools.get_mut(platform) else {
            return;
        };
        if let Some(slot) = pool
            .slots
            .iter_mut()
            .find(|s| s.identity.label == identity.label)
        {
            slot.cooldown_until = Some(Instant::now() + self.failure_cooldown);
            tracing::info!(
                platform = %platform,
                identity = %identity.label,
                cooldown_ms = self.failure_cooldown.as_millis() as u64,
                "Identity flagged, extended cooldown"
            );
        }
    }

    /// Reset every cooldown for a platform immediately. Used for recovery
    /// and testing; safe to call concurrently with in-flight hand-outs.
    pub fn clear(&self, platform: &PlatformKey) {
        let mut pools = self.pools.lock().unwrap();
        if let Some(pool) = pools.get_mut(platform) {
            for slot in &mut pool.slots {
                slot.cooldown_until = None;
            }
            pool.cursor = 0;
            tracing::info!(platform = %platform, "Rotation state cleared");
        }
    }

    /// Pool size for a platform, if registered.
    pub fn pool_size(&self, platform: &PlatformKey) -> Option<usize> {
        self.pools
            .lock()
            .unwrap()
            .get(platform)
            .map(|p| p.slots.len())
    }

    /// Identities currently outside cooldown.
    pub fn available_count(&self, platform: &PlatformKey) -> Option<usize> {
        let now = Instant::now();
        self.pools.lock().unwrap().get(platform).map(|p| {
            p.slots
                .iter()
                .filter(|s| s.cooldown_until.map(|u| u <= now).unwrap_or(true))
                .count()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn service_with_pool(size: usize) -> (RotationService, PlatformKey) {
        let service = RotationService::new(
            Duration::from_millis(200),
            Duration::from_millis(500),
        );
        let platform = PlatformKey::from("stubhub");
        let identities = (0..size)
            .map(|i| Identity::labeled(format!("id-{i}")))
            .collect();
        service.register_pool(platform.clone(), identities);
        (service, platform)
    }

    #[test]
    fn test_round_robin_never_repeats_within_cooldown() {
        let (service, platform) = service_with_pool(4);

        let mut seen = Vec::new();
        for _ in 0..4 {
            let identity = service.next_identity(&platform).unwrap();
            assert!(
                !seen.contains(&identity.label),
                "identity {} handed out twice within cooldown",
                identity.label
            );
            seen.push(identity.label);
        }
    }

    #[test]
    fn test_exhausted_when_all_cooling() {
        let (service, platform) = service_with_pool(3);

        for _ in 0..3 {
            service.next_identity(&platform).unwrap();
        }
        let err = service.next_identity(&platform).unwrap_err();
        assert!(matches!(err, PlatformError::Exhausted(_)));
    }

    #[test]
    fn test_clear_makes_identities_available_again() {
        let (service, platform) = service_with_pool(2);

        service.next_identity(&platform).unwrap();
        service.next_identity(&platform).unwrap();
        assert!(service.next_identity(&platform).is_err());

        service.clear(&platform);
        assert_eq!(service.available_count(&platform), Some(2));
        service.next_identity(&platform).unwrap();
    }

    #[test]
    fn test_failure_extends_cooldown() {
        let service = RotationService::new(
            Duration::from_millis(0),
            Duration::from_secs(60),
        );
        let platform = PlatformKey::from("seatgeek");
        service.register_pool(platform.clone(), vec![Identity::labeled("only")]);

        // Zero success cooldown: the identity is immediately reusable...
        let identity = service.next_identity(&platform).unwrap();
        service.next_identity(&platform).unwrap();

        // ...until a failure is recorded against it.
        service.record_outcome(&platform, &identity, false);
        assert!(matches!(
            service.next_identity(&platform),
            Err(PlatformError::Exhausted(_))
        ));
    }

    #[test]
    fn test_unknown_platform_is_not_found() {
        let (service, _) = service_with_pool(1);
        let err = service
            .next_identity(&PlatformKey::from("unknown"))
            .unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_clear_concurrent_with_handouts() {
        let (service, platform) = service_with_pool(8);
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = Arc::clone(&service);
            let platform = platform.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    // Errors are fine here; panics are not.
                    let _ = service.next_identity(&platform);
                }
            }));
        }
        let clearer = {
            let service = Arc::clone(&service);
            let platform = platform.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    service.clear(&platform);
                }
            })
        };

        for handle in handles {
            handle.await.unwrap();
        }
        clearer.await.unwrap();

        service.clear(&platform);
        assert_eq!(service.available_count(&platform), Some(8));
    }
}
