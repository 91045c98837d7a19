mod admin;
mod auth;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use auth::{AuthUser, LOGIN_PATH, Viewer, login_location};
pub use public::build_router;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::application::feed::FeedService;
use crate::application::follow::FollowService;
use crate::application::pagination::Paginator;
use crate::application::posts::PostService;
use crate::application::repos::{Repositories, SessionsRepo};
use crate::cache::ListingCacheState;

/// Services shared by the public router.
#[derive(Clone)]
pub struct HttpState {
    pub feed: FeedService,
    pub follow: FollowService,
    pub posts: PostService,
    pub sessions: Arc<dyn SessionsRepo>,
    pub listing_cache: ListingCacheState,
}

impl HttpState {
    pub fn new(
        repositories: &Repositories,
        paginator: Paginator,
        listing_cache: ListingCacheState,
    ) -> Self {
        Self {
            feed: FeedService::new(
                repositories.posts.clone(),
                repositories.groups.clone(),
                repositories.users.clone(),
                repositories.follows.clone(),
                paginator,
            ),
            follow: FollowService::new(repositories.users.clone(), repositories.follows.clone()),
            posts: PostService::new(
                repositories.posts.clone(),
                repositories.posts_write.clone(),
                repositories.groups.clone(),
                repositories.comments.clone(),
            ),
            sessions: repositories.sessions.clone(),
            listing_cache,
        }
    }
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
