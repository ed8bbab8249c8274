//! Bounded in-memory cache of decoded textures keyed by tile.
//!
//! The evictable tier is a `moka::sync::Cache` with an LRU eviction policy,
//! weighted by texture size in bytes. Moka is internally synchronized, so the
//! traversal thread and every fetch worker can use the cache concurrently
//! without external locking.
//!
//! When level-zero retention is enabled, level-zero textures are kept in a
//! separate pinned tier that is never evicted and does not count against the
//! byte budget, guaranteeing the coarsest imagery stays available as the
//! ultimate fallback.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;

use super::texture::Texture;
use crate::tile::TileKey;

/// Default memory budget (512 MiB).
pub const DEFAULT_MEMORY_CACHE_BYTES: u64 = 512 * 1024 * 1024;

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entry_count: u64,
    pub size_bytes: u64,
    pub retained_entries: u64,
    pub retained_bytes: u64,
}

impl ResourceCacheStats {
    /// Fraction of lookups that hit, or 0 with no lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for ResourceCacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries ({} bytes), {} retained ({} bytes), hit rate {:.1}%, {} evictions",
            self.entry_count,
            self.size_bytes,
            self.retained_entries,
            self.retained_bytes,
            self.hit_rate() * 100.0,
            self.evictions
        )
    }
}

/// In-memory texture cache with least-recently-touched eviction.
pub struct ResourceCache {
    cache: Cache<TileKey, Arc<Texture>>,
    retained: DashMap<TileKey, Arc<Texture>>,
    retain_level_zero: bool,
    max_size_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: Arc<AtomicU64>,
}

impl ResourceCache {
    /// Creates a cache with the given byte budget.
    ///
    /// # Arguments
    ///
    /// * `max_size_bytes` - Budget for the evictable tier
    /// * `retain_level_zero` - Pin level-zero textures outside the budget
    pub fn new(max_size_bytes: u64, retain_level_zero: bool) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let listener_evictions = Arc::clone(&evictions);

        let cache = Cache::builder()
            .weigher(|_key: &TileKey, value: &Arc<Texture>| -> u32 {
                value.size_bytes().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_size_bytes)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |key: Arc<TileKey>, _value, cause| {
                if cause == RemovalCause::Size {
                    listener_evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(tile = %key, "Evicted texture");
                }
            })
            .build();

        Self {
            cache,
            retained: DashMap::new(),
            retain_level_zero,
            max_size_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions,
        }
    }

    fn is_retained_key(&self, key: &TileKey) -> bool {
        self.retain_level_zero && key.level == 0
    }

    /// Looks up a texture, marking it most recently used.
    pub fn get(&self, key: &TileKey) -> Option<Arc<Texture>> {
        let found = if self.is_retained_key(key) {
            self.retained.get(key).map(|entry| Arc::clone(entry.value()))
        } else {
            self.cache.get(key)
        };
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Inserts or replaces a texture, evicting as needed to stay in budget.
    pub fn put(&self, key: TileKey, texture: Arc<Texture>) {
        if self.is_retained_key(&key) {
            self.retained.insert(key, texture);
            return;
        }
        self.cache.insert(key, texture);
        self.cache.run_pending_tasks();
    }

    /// True when the key is resident. Does not affect recency.
    pub fn contains(&self, key: &TileKey) -> bool {
        if self.is_retained_key(key) {
            self.retained.contains_key(key)
        } else {
            self.cache.contains_key(key)
        }
    }

    pub fn remove(&self, key: &TileKey) {
        self.retained.remove(key);
        self.cache.invalidate(key);
    }

    /// Drops every entry, including retained level-zero textures.
    pub fn clear(&self) {
        self.retained.clear();
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    /// Number of resident textures in both tiers.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count() + self.retained.len() as u64
    }

    /// Bytes used by the evictable tier.
    pub fn size_bytes(&self) -> u64 {
        self.cache.weighted_size()
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn retains_level_zero(&self) -> bool {
        self.retain_level_zero
    }

    pub fn stats(&self) -> ResourceCacheStats {
        let retained_bytes = self
            .retained
            .iter()
            .map(|entry| entry.value().size_bytes() as u64)
            .sum();
        ResourceCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: self.cache.entry_count(),
            size_bytes: self.cache.weighted_size(),
            retained_entries: self.retained.len() as u64,
            retained_bytes,
        }
    }
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("max_size_bytes", &self.max_size_bytes)
            .field("retain_level_zero", &self.retain_level_zero)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn key(level: usize, col: i32) -> TileKey {
        TileKey::new(level, 0, col, "test")
    }

    fn texture(size: usize) -> Arc<Texture> {
        Arc::new(Texture::raw(
            "application/octet-stream",
            Bytes::from(vec![0u8; size]),
        ))
    }

    #[test]
    fn test_put_and_get() {
        let cache = ResourceCache::new(1_000_000, false);
        let k = key(1, 1);
        cache.put(k.clone(), texture(100));

        let found = cache.get(&k).unwrap();
        assert_eq!(found.size_bytes(), 100);
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.size_bytes(), 100);
    }

    #[test]
    fn test_miss_and_hit_counters() {
        let cache = ResourceCache::new(1_000_000, false);
        let k = key(1, 1);
        assert!(cache.get(&k).is_none());
        cache.put(k.clone(), texture(10));
        cache.get(&k);
        cache.get(&k);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_evicts_least_recently_touched() {
        // Room for two 1000-byte textures
        let cache = ResourceCache::new(2500, false);
        let (k1, k2, k3) = (key(1, 1), key(1, 2), key(1, 3));

        cache.put(k1.clone(), texture(1000));
        cache.put(k2.clone(), texture(1000));

        // Touch k1 so k2 becomes the least recently used
        assert!(cache.get(&k1).is_some());

        cache.put(k3.clone(), texture(1000));

        assert!(cache.contains(&k1), "recently touched entry should survive");
        assert!(!cache.contains(&k2), "least recently touched entry should go");
        assert!(cache.contains(&k3));
        assert!(cache.size_bytes() <= 2500);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_level_zero_retained_when_enabled() {
        let cache = ResourceCache::new(1500, true);
        let root = key(0, 0);
        cache.put(root.clone(), texture(1000));
        cache.put(key(1, 1), texture(1000));
        cache.put(key(1, 2), texture(1000));

        assert!(cache.contains(&root));
        assert!(cache.get(&root).is_some());
        assert!(!cache.contains(&key(1, 1)));
        assert!(cache.contains(&key(1, 2)));

        let stats = cache.stats();
        assert_eq!(stats.retained_entries, 1);
        assert_eq!(stats.retained_bytes, 1000);
    }

    #[test]
    fn test_level_zero_evictable_when_disabled() {
        let cache = ResourceCache::new(1500, false);
        let root = key(0, 0);
        cache.put(root.clone(), texture(1000));
        cache.put(key(1, 1), texture(1000));

        assert!(!cache.contains(&root));
        assert!(cache.contains(&key(1, 1)));
    }

    #[test]
    fn test_contains_does_not_touch() {
        let cache = ResourceCache::new(2500, false);
        let (k1, k2, k3) = (key(1, 1), key(1, 2), key(1, 3));
        cache.put(k1.clone(), texture(1000));
        cache.put(k2.clone(), texture(1000));
        assert!(cache.contains(&k1));
        cache.put(k3, texture(1000));
        assert!(!cache.contains(&k1));
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_clear_and_remove() {
        let cache = ResourceCache::new(1_000_000, true);
        cache.put(key(0, 0), texture(10));
        cache.put(key(1, 0), texture(10));
        cache.remove(&key(1, 0));
        assert!(!cache.contains(&key(1, 0)));
        cache.clear();
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(ResourceCache::new(10_000_000, true));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let k = key(t % 2, i);
                        cache.put(k.clone(), texture(100));
                        assert!(cache.get(&k).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.entry_count() > 0);
    }
}
