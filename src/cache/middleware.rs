//! Listing cache middleware.
//!
//! Wraps the global index handler: a fresh entry for the requester's key is
//! replayed as-is, otherwise the handler runs and its output is stored.
//! Backend failures degrade to running the handler uncached.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::{
    ListingCacheConfig,
    keys::{ListingKey, session_from_headers},
    store::{CacheError, CachedPage, ListingCache},
};

/// Shared cache state for the middleware.
#[derive(Clone)]
pub struct ListingCacheState {
    pub config: ListingCacheConfig,
    pub cache: Arc<dyn ListingCache>,
}

impl ListingCacheState {
    pub fn new(config: ListingCacheConfig, cache: Arc<dyn ListingCache>) -> Self {
        Self { config, cache }
    }

    /// Flush every cached listing.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.cache.clear()
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn listing_cache_layer(
    State(state): State<ListingCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.enabled || request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = ListingKey::index(
        request.uri().path(),
        request.uri().query().unwrap_or(""),
        session_from_headers(request.headers()),
    );

    match state.cache.get(&key) {
        Ok(Some(cached)) => {
            counter!("gazette_listing_cache_hit_total").increment(1);
            debug!(cache = "listing", outcome = "hit", "serving cached listing");
            return build_response(cached);
        }
        Ok(None) => {
            counter!("gazette_listing_cache_miss_total").increment(1);
            debug!(cache = "listing", outcome = "miss", "rendering listing");
        }
        Err(err) => {
            counter!("gazette_listing_cache_error_total").increment(1);
            warn!(
                cache = "listing",
                error = %err,
                "listing cache lookup failed; rendering uncached"
            );
            return next.run(request).await;
        }
    }

    let response = next.run(request).await;
    if !should_store_response(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(
                cache = "listing",
                error = %err,
                "failed to buffer listing body"
            );
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            return response;
        }
    };

    let cached = CachedPage::new(parts.status, &parts.headers, bytes.clone());
    if let Err(err) = state.cache.set(key, cached) {
        counter!("gazette_listing_cache_error_total").increment(1);
        warn!(
            cache = "listing",
            error = %err,
            "failed to store rendered listing"
        );
    }

    Response::from_parts(parts, Body::from(bytes))
}

/// Only plain successful renders are replayable; anything that sets a cookie
/// belongs to a single requester.
pub fn should_store_response(response: &Response) -> bool {
    response.status() == StatusCode::OK && !response.headers().contains_key(header::SET_COOKIE)
}

fn build_response(cached: CachedPage) -> Response {
    let mut builder = Response::builder().status(cached.status);
    for (name, value) in cached.headers {
        if let Ok(value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, value);
        }
    }

    builder.body(Body::from(cached.body)).unwrap_or_else(|err| {
        warn!(cache = "listing", error = %err, "failed to rebuild cached listing");
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}
