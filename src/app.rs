//! Wiring of repositories, services and the listing cache into the two routers.

use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::application::pagination::Paginator;
use crate::application::repos::Repositories;
use crate::cache::{ListingCache, ListingCacheConfig, ListingCacheState, MemoryListingCache};
use crate::config::Settings;
use crate::infra::db::PostgresRepositories;
use crate::infra::http::{self, AdminState, HttpState};

/// Public and admin routers sharing one listing cache.
pub struct Application {
    pub public: Router,
    pub admin: Router,
    pub listing_cache: ListingCacheState,
}

impl Application {
    pub fn new(
        repositories: Repositories,
        db: Option<PostgresRepositories>,
        settings: &Settings,
    ) -> Self {
        let config = ListingCacheConfig::from(&settings.listing_cache);
        let cache: Arc<dyn ListingCache> = Arc::new(MemoryListingCache::new(&config));
        Self::with_cache(repositories, db, settings, cache)
    }

    /// Build with a caller-supplied cache backend.
    pub fn with_cache(
        repositories: Repositories,
        db: Option<PostgresRepositories>,
        settings: &Settings,
        cache: Arc<dyn ListingCache>,
    ) -> Self {
        let config = ListingCacheConfig::from(&settings.listing_cache);
        info!(
            target = "gazette::bootstrap",
            enabled = config.enabled,
            ttl_secs = cache.ttl().as_secs_f64(),
            capacity = config.capacity,
            "listing cache ready"
        );
        let listing_cache = ListingCacheState::new(config, cache);
        let paginator = Paginator::new(settings.feed.page_size);

        let http_state = HttpState::new(&repositories, paginator, listing_cache.clone());
        let admin_state = AdminState::new(&repositories, db, listing_cache.clone());

        Self {
            public: http::build_router(http_state),
            admin: http::build_admin_router(admin_state),
            listing_cache,
        }
    }
}
