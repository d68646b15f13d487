//! Tag-indexed TTL cache for read models.
//!
//! Every entry is written with the set of entity tags it depends on; an
//! invalidation resolves a tag to its exact keys instead of scanning key
//! patterns. Entries also expire passively, so a missed invalidation heals
//! within one TTL.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use uuid::Uuid;

/// An entity a cached read model depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTag {
    Issue(Uuid),
    Report(Uuid),
    User(Uuid),
    /// List and aggregate views that any issue/report mutation can change.
    Statistics,
}

/// TTL class per view kind: volatile aggregates turn over in seconds,
/// stable detail views live for tens of minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    Volatile,
    Stable,
}

impl CacheTtl {
    pub fn duration(self) -> Duration {
        match self {
            CacheTtl::Volatile => Duration::from_secs(45),
            CacheTtl::Stable => Duration::from_secs(20 * 60),
        }
    }
}

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
    tags: Vec<CacheTag>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    by_tag: HashMap<CacheTag, HashSet<String>>,
}

impl CacheInner {
    fn remove_entry(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            for tag in &entry.tags {
                if let Some(keys) = self.by_tag.get_mut(tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.by_tag.remove(tag);
                    }
                }
            }
        }
    }
}

#[derive(Default)]
pub struct ReadCache {
    inner: RwLock<CacheInner>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a live entry. Expired entries read as misses and are left for the
    /// purge loop.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Insert a read model under its dependency tags.
    pub fn insert(&self, key: &str, value: serde_json::Value, ttl: CacheTtl, tags: Vec<CacheTag>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        // Replacing an entry re-homes its tag index entries.
        inner.remove_entry(key);
        for tag in &tags {
            inner
                .by_tag
                .entry(*tag)
                .or_default()
                .insert(key.to_string());
        }
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl.duration(),
                tags,
            },
        );
    }

    /// Remove every entry tagged with `tag`. Returns how many were dropped.
    pub fn remove_by_tag(&self, tag: CacheTag) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let keys: Vec<String> = inner
            .by_tag
            .get(&tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        for key in &keys {
            inner.remove_entry(key);
        }
        debug!(?tag, removed = keys.len(), "Cache tag invalidated");
        keys.len()
    }

    pub fn remove_key(&self, key: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.remove_entry(key);
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries past their expiry.
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove_entry(key);
        }
        expired.len()
    }

    /// Spawn a background loop purging expired entries once a minute.
    pub fn spawn_purge_loop(self: &Arc<Self>) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    info!(purged, remaining = cache.len(), "Expired cache entries purged");
                }
            }
        });
    }
}
