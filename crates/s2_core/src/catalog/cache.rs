//! Bounded memo of catalog listings keyed by `(cell, satellite)`.
//!
//! Historical listings are append-only within a session, so a listing can be
//! reused for a while. Entries expire after an optional TTL and can be
//! dropped explicitly when the caller needs fresh acquisitions.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;

use super::keys::Satellite;
use crate::grid::GridCell;

pub const DEFAULT_LISTING_CACHE_CAPACITY: usize = 256;
pub const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(12 * 60 * 60);

pub type ListingKey = (GridCell, Satellite);

struct Entry {
    stored_at: Instant,
    paths: Arc<Vec<String>>,
}

pub struct ListingCache {
    entries: LruCache<ListingKey, Entry>,
    ttl: Option<Duration>,
    hits: u64,
    misses: u64,
}

impl ListingCache {
    /// `ttl = None` keeps entries until they are evicted by capacity.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    /// Cached listing, unless absent or older than the TTL at `now`.
    pub fn get(&mut self, key: &ListingKey, now: Instant) -> Option<Arc<Vec<String>>> {
        let expired = match self.entries.get(key) {
            Some(entry) => self
                .ttl
                .is_some_and(|ttl| now.saturating_duration_since(entry.stored_at) >= ttl),
            None => {
                self.misses += 1;
                return None;
            }
        };
        if expired {
            self.entries.pop(key);
            self.misses += 1;
            return None;
        }
        self.hits += 1;
        self.entries.get(key).map(|entry| Arc::clone(&entry.paths))
    }

    pub fn put(&mut self, key: ListingKey, paths: Vec<String>, now: Instant) -> Arc<Vec<String>> {
        let paths = Arc::new(paths);
        self.entries.put(
            key,
            Entry {
                stored_at: now,
                paths: Arc::clone(&paths),
            },
        );
        paths
    }

    pub fn invalidate(&mut self, key: &ListingKey) {
        self.entries.pop(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

impl Default for ListingCache {
    fn default() -> Self {
        Self::new(DEFAULT_LISTING_CACHE_CAPACITY, Some(DEFAULT_LISTING_TTL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(cell: &str) -> ListingKey {
        (cell.parse().expect("cell"), Satellite::A)
    }

    #[test]
    fn returns_cached_listing_until_ttl() {
        let mut cache = ListingCache::new(4, Some(Duration::from_secs(60)));
        let t0 = Instant::now();
        cache.put(key("32/T/MT"), vec!["a".into()], t0);

        let hit = cache.get(&key("32/T/MT"), t0 + Duration::from_secs(59));
        assert_eq!(hit.as_deref(), Some(&vec!["a".to_string()]));
        assert!(cache
            .get(&key("32/T/MT"), t0 + Duration::from_secs(60))
            .is_none());
        assert!(cache.is_empty());
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = ListingCache::new(2, None);
        let now = Instant::now();
        cache.put(key("1/C/CV"), vec![], now);
        cache.put(key("2/C/CV"), vec![], now);
        cache.get(&key("1/C/CV"), now);
        cache.put(key("3/C/CV"), vec![], now);

        assert!(cache.get(&key("1/C/CV"), now).is_some());
        assert!(cache.get(&key("2/C/CV"), now).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_and_clear_drop_entries() {
        let mut cache = ListingCache::default();
        let now = Instant::now();
        cache.put(key("1/C/CV"), vec![], now);
        cache.put(key("2/C/CV"), vec![], now);
        cache.invalidate(&key("1/C/CV"));
        assert!(cache.get(&key("1/C/CV"), now).is_none());
        cache.clear();
        assert!(cache.is_empty());
    }
}
