//! Listing cache.
//!
//! Memoizes the rendered global index per requester for a short TTL.
//! Invalidation is purely time based, plus an explicit full flush.

mod config;
mod keys;
mod lock;
mod middleware;
mod store;

pub use config::{DEFAULT_LISTING_TTL, ListingCacheConfig};
pub use keys::{INDEX_NAMESPACE, ListingKey, SESSION_COOKIE, hash_query, session_from_headers};
pub use middleware::{ListingCacheState, listing_cache_layer, should_store_response};
pub use store::{
    CacheError, CachedPage, Clock, ListingCache, ManualClock, MemoryListingCache, SystemClock,
};
