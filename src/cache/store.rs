//! Listing cache storage.
//!
//! Entries are stamped with the instant they were stored and expire lazily:
//! a lookup past the TTL removes the entry and reports a miss. Nothing else
//! invalidates an entry except [`ListingCache::clear`].

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;

use super::config::ListingCacheConfig;
use super::keys::ListingKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// A fully rendered response kept for replay.
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedPage {
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        Self {
            status: status.as_u16(),
            headers: headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.to_string(), value.to_string()))
                })
                .collect(),
            body,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("listing cache unavailable: {0}")]
    Unavailable(String),
}

/// Source of the current instant, injectable so expiry can be driven by tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self
            .elapsed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *elapsed += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let elapsed = self
            .elapsed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.origin + *elapsed
    }
}

/// Injectable listing cache backend.
///
/// Concurrent misses for the same key may both populate it; the last write wins.
pub trait ListingCache: Send + Sync {
    fn get(&self, key: &ListingKey) -> Result<Option<CachedPage>, CacheError>;

    fn set(&self, key: ListingKey, page: CachedPage) -> Result<(), CacheError>;

    /// Drop every entry regardless of age.
    fn clear(&self) -> Result<(), CacheError>;

    fn ttl(&self) -> Duration;
}

#[derive(Debug, Clone)]
struct Entry {
    page: CachedPage,
    stored_at: Instant,
}

/// In-process LRU listing cache.
pub struct MemoryListingCache {
    entries: RwLock<LruCache<ListingKey, Entry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryListingCache {
    pub fn new(config: &ListingCacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &ListingCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
            ttl: config.ttl,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ListingCache for MemoryListingCache {
    fn get(&self, key: &ListingKey) -> Result<Option<CachedPage>, CacheError> {
        let now = self.clock.now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");

        match entries.get(key) {
            None => return Ok(None),
            Some(entry) if now.saturating_duration_since(entry.stored_at) < self.ttl => {
                return Ok(Some(entry.page.clone()));
            }
            Some(_) => {}
        }

        entries.pop(key);
        counter!("gazette_listing_cache_expired_total").increment(1);
        Ok(None)
    }

    fn set(&self, key: ListingKey, page: CachedPage) -> Result<(), CacheError> {
        let entry = Entry {
            page,
            stored_at: self.clock.now(),
        };
        let evicted = rw_write(&self.entries, SOURCE, "set").push(key.clone(), entry);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!("gazette_listing_cache_evict_total").increment(1);
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "clear").clear();
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &'static str) -> CachedPage {
        CachedPage {
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: Bytes::from(body),
        }
    }

    fn cache_with_clock(capacity: usize) -> (MemoryListingCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = ListingCacheConfig {
            capacity,
            ..Default::default()
        };
        (MemoryListingCache::with_clock(&config, clock.clone()), clock)
    }

    #[test]
    fn entry_is_served_until_ttl_elapses() {
        let (cache, clock) = cache_with_clock(8);
        let key = ListingKey::index("/", "", None);
        assert_eq!(cache.ttl(), Duration::from_secs(20));

        assert!(cache.get(&key).unwrap().is_none());
        cache.set(key.clone(), page("v1")).unwrap();

        clock.advance(Duration::from_secs(19));
        let cached = cache.get(&key).unwrap().expect("still fresh");
        assert_eq!(cached.body, Bytes::from("v1"));

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&key).unwrap().is_none());
        assert!(cache.is_empty(), "expired entry removed on lookup");
    }

    #[test]
    fn rewrite_restarts_the_ttl() {
        let (cache, clock) = cache_with_clock(8);
        let key = ListingKey::index("/", "", None);

        cache.set(key.clone(), page("v1")).unwrap();
        clock.advance(Duration::from_secs(15));
        cache.set(key.clone(), page("v2")).unwrap();
        clock.advance(Duration::from_secs(15));

        let cached = cache.get(&key).unwrap().expect("refreshed entry");
        assert_eq!(cached.body, Bytes::from("v2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_drops_every_entry() {
        let (cache, _) = cache_with_clock(8);
        let anonymous = ListingKey::index("/", "", None);
        let viewer = ListingKey::index("/", "", Some("token".to_string()));

        cache.set(anonymous.clone(), page("a")).unwrap();
        cache.set(viewer.clone(), page("b")).unwrap();
        cache.clear().unwrap();

        assert!(cache.get(&anonymous).unwrap().is_none());
        assert!(cache.get(&viewer).unwrap().is_none());
    }

    #[test]
    fn sessions_are_cached_independently() {
        let (cache, _) = cache_with_clock(8);
        let alice = ListingKey::index("/", "", Some("alice".to_string()));
        let bob = ListingKey::index("/", "", Some("bob".to_string()));

        cache.set(alice.clone(), page("alice")).unwrap();

        assert!(cache.get(&bob).unwrap().is_none());
        assert_eq!(cache.get(&alice).unwrap().unwrap().body, Bytes::from("alice"));
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let (cache, _) = cache_with_clock(2);
        let first = ListingKey::index("/", "page=1", None);
        let second = ListingKey::index("/", "page=2", None);
        let third = ListingKey::index("/", "page=3", None);

        cache.set(first.clone(), page("1")).unwrap();
        cache.set(second.clone(), page("2")).unwrap();
        cache.get(&first).unwrap();
        cache.set(third.clone(), page("3")).unwrap();

        assert!(cache.get(&second).unwrap().is_none());
        assert!(cache.get(&first).unwrap().is_some());
        assert!(cache.get(&third).unwrap().is_some());
    }
}
