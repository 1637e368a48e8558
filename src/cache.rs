// src/cache.rs

//! Process-lifetime TTL caches for availability probes and version metadata
//!
//! Entries are keyed maps guarded by a read-write lock with per-key
//! atomicity; concurrent writers race and the last one wins, which is
//! acceptable for both caches (redundant fetches produce identical values).
//! Entries are never evicted by size, only judged against their TTL at
//! lookup time.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Predicate applied when a cache entry is consulted.
///
/// `ServeFresh` serves entries while `expires_at >= now`. `ServeStale`
/// serves entries only once they are expired, which is the literal
/// behavior of the system this client was modeled on; it exists as a named
/// policy so deployments can compare the two observable behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FreshnessPolicy {
    #[default]
    ServeFresh,
    ServeStale,
}

impl FreshnessPolicy {
    fn serves(&self, expires_at: Instant, now: Instant) -> bool {
        match self {
            Self::ServeFresh => expires_at >= now,
            Self::ServeStale => expires_at < now,
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

pub(crate) struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    policy: FreshnessPolicy,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, policy: FreshnessPolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            policy,
        }
    }

    /// Look up a key, applying the freshness policy.
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = entries.get(key)?;
        self.policy
            .serves(entry.expires_at, Instant::now())
            .then(|| entry.value.clone())
    }

    /// Insert or replace a key with a fresh TTL.
    pub fn put(&self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key, CacheEntry { value, expires_at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_fresh_returns_unexpired_entries() {
        let cache = TtlCache::new(Duration::from_secs(60), FreshnessPolicy::ServeFresh);
        cache.put("key", 1u32);
        assert_eq!(cache.get(&"key"), Some(1));
    }

    #[test]
    fn test_serve_fresh_drops_expired_entries() {
        let cache = TtlCache::new(Duration::ZERO, FreshnessPolicy::ServeFresh);
        cache.put("key", 1u32);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"key"), None);
    }

    #[test]
    fn test_serve_stale_inverts_the_predicate() {
        let cache = TtlCache::new(Duration::from_secs(60), FreshnessPolicy::ServeStale);
        cache.put("key", 1u32);
        assert_eq!(cache.get(&"key"), None);

        let expired = TtlCache::new(Duration::ZERO, FreshnessPolicy::ServeStale);
        expired.put("key", 1u32);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(expired.get(&"key"), Some(1));
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let cache = TtlCache::new(Duration::from_secs(60), FreshnessPolicy::ServeFresh);
        cache.put("key", 1u32);
        cache.put("key", 2u32);
        assert_eq!(cache.get(&"key"), Some(2));
    }

    #[test]
    fn test_missing_key() {
        let cache: TtlCache<&str, u32> =
            TtlCache::new(Duration::from_secs(60), FreshnessPolicy::ServeFresh);
        assert_eq!(cache.get(&"missing"), None);
    }
}
