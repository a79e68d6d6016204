//! In-memory response cache with per-entry TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pipedeck_shared::time::Clock;

use super::key::resource_prefix;

/// One cached response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub ttl_seconds: u64,
    /// Unix timestamp (milliseconds)
    pub inserted_at: i64,
}

impl CacheEntry {
    /// Expired once `now >= inserted_at + ttl`; the boundary itself is expired
    pub fn is_expired(&self, now_millis: i64) -> bool {
        let ttl_millis = i64::try_from(self.ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        now_millis >= self.inserted_at.saturating_add(ttl_millis)
    }
}

/// Key/value cache consulted by list endpoints before the gateway.
///
/// A miss is just `None`; callers fall through to the network.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Cached value for `key`, evicting it if it has expired
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now_millis();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                tracing::trace!("Cache hit: {}", key);
                Some(entry.value.clone())
            }
            Some(_) => {
                tracing::trace!("Cache entry expired: {}", key);
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Vec<u8>, ttl_seconds: u64) {
        let key = key.into();
        let entry = CacheEntry {
            key: key.clone(),
            value,
            ttl_seconds,
            inserted_at: self.clock.now_millis(),
        };
        self.lock().insert(key, entry);
    }

    /// Remove every entry whose key starts with `prefix`; returns how many were removed
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!("Invalidated {} cache entries under '{}'", removed, prefix);
        }
        removed
    }

    /// Remove every entry of `resource` for `tenant`
    pub fn invalidate_resource(&self, tenant: &str, resource: &str) -> usize {
        self.invalidate_prefix(&resource_prefix(tenant, resource))
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
