//! Listing cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

/// Reference expiry for cached listings.
pub const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(20);
const DEFAULT_LISTING_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ListingCacheConfig {
    /// When false, the middleware passes every request straight through.
    pub enabled: bool,
    pub ttl: Duration,
    /// Maximum number of cached pages before the least recently used is evicted.
    pub capacity: usize,
}

impl Default for ListingCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_LISTING_TTL,
            capacity: DEFAULT_LISTING_CAPACITY,
        }
    }
}

impl From<&crate::config::ListingCacheSettings> for ListingCacheConfig {
    fn from(settings: &crate::config::ListingCacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl: settings.ttl,
            capacity: settings.capacity,
        }
    }
}

impl ListingCacheConfig {
    /// Capacity as `NonZeroUsize`, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
