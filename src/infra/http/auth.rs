//! Session-backed viewer extraction.
//!
//! The `sessionid` cookie is resolved to an account once per request by
//! [`resolve_viewer`]. Guarded handlers take [`AuthUser`], which redirects
//! anonymous requests to the login page instead of reaching the handler.

use axum::{
    body::Body,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::cache::session_from_headers;
use crate::domain::entities::UserRecord;

use super::HttpState;
use super::middleware::{ServedViewer, SessionOutcome};

pub const LOGIN_PATH: &str = "/auth/login/";

/// The requester's account, if the session cookie resolves to one.
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<UserRecord>);

impl Viewer {
    pub fn user(&self) -> Option<&UserRecord> {
        self.0.as_ref()
    }
}

/// A signed-in requester. Rejects with a redirect to the login page.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserRecord);

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
    HttpState: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(viewer) = parts.extensions.get::<Viewer>() {
            return Ok(viewer.clone());
        }

        // Routers without the resolver layer look the session up here.
        let state = HttpState::from_ref(state);
        let (_, user) = resolve_session(&state, &parts.headers).await;
        let viewer = Viewer(user);
        parts.extensions.insert(viewer.clone());
        Ok(viewer)
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    HttpState: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Viewer(viewer) = Viewer::from_request_parts(parts, state).await?;
        match viewer {
            Some(user) => Ok(AuthUser(user)),
            None => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                Err(found(&login_location(next)))
            }
        }
    }
}

/// Resolve the session cookie, hand the [`Viewer`] to extractors and tag the
/// response with who was served.
pub async fn resolve_viewer(
    State(state): State<HttpState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let (session, user) = resolve_session(&state, request.headers()).await;
    let served = ServedViewer {
        session,
        username: user.as_ref().map(|user| user.username.clone()),
    };
    request.extensions_mut().insert(Viewer(user));

    let mut response = next.run(request).await;
    response.extensions_mut().insert(served);
    response
}

async fn resolve_session(
    state: &HttpState,
    headers: &HeaderMap,
) -> (SessionOutcome, Option<UserRecord>) {
    let Some(token) = session_from_headers(headers) else {
        return (SessionOutcome::Anonymous, None);
    };
    match state.sessions.find_user_by_session(&token).await {
        Ok(Some(user)) => (SessionOutcome::Resolved, Some(user)),
        Ok(None) => (SessionOutcome::Unresolved, None),
        Err(err) => {
            // Treat the requester as anonymous rather than failing the page.
            warn!(
                target = "gazette::http::auth",
                error = %err,
                "failed to resolve session"
            );
            (SessionOutcome::Unresolved, None)
        }
    }
}

/// `/auth/login/?next=<path>` with the target percent-encoded.
pub fn login_location(next: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
    format!("{LOGIN_PATH}?next={encoded}")
}

/// 302 redirect.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{Router, middleware, routing::get};
    use tower::ServiceExt;

    use super::*;
    use crate::application::pagination::Paginator;
    use crate::application::repos::{CreateUserParams, Repositories, SessionsRepo, UsersRepo};
    use crate::cache::{ListingCacheConfig, ListingCacheState, MemoryListingCache};
    use crate::infra::memory::MemoryRepositories;

    async fn whoami(viewer: Viewer) -> String {
        viewer
            .user()
            .map(|user| user.username.clone())
            .unwrap_or_default()
    }

    async fn served(router: &Router, cookie: Option<&str>) -> (ServedViewer, String) {
        let mut request = Request::get("/");
        if let Some(token) = cookie {
            request = request.header(header::COOKIE, format!("sessionid={token}"));
        }
        let response = router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let served = response.extensions().get::<ServedViewer>().unwrap().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (served, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn resolver_tags_each_session_outcome() {
        let store = Arc::new(MemoryRepositories::new());
        let user = store
            .create_user(CreateUserParams {
                username: "leo".to_string(),
                display_name: String::new(),
            })
            .await
            .unwrap();
        let token = store.create_session(user.id).await.unwrap();

        let config = ListingCacheConfig::default();
        let cache = Arc::new(MemoryListingCache::new(&config));
        let state = HttpState::new(
            &Repositories::from_store(store),
            Paginator::default(),
            ListingCacheState::new(config, cache),
        );
        let router = Router::new()
            .route("/", get(whoami))
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(state, resolve_viewer));

        let (anonymous, body) = served(&router, None).await;
        assert_eq!(anonymous.session, SessionOutcome::Anonymous);
        assert_eq!(body, "");

        let (resolved, body) = served(&router, Some(&token)).await;
        assert_eq!(resolved.session, SessionOutcome::Resolved);
        assert_eq!(resolved.username.as_deref(), Some("leo"));
        assert_eq!(body, "leo");

        let (stale, body) = served(&router, Some("expired")).await;
        assert_eq!(stale.session, SessionOutcome::Unresolved);
        assert!(stale.username.is_none());
        assert_eq!(body, "");
    }

    #[test]
    fn login_location_encodes_next() {
        assert_eq!(login_location("/follow/"), "/auth/login/?next=%2Ffollow%2F");
        assert_eq!(
            login_location("/follow/?page=2"),
            "/auth/login/?next=%2Ffollow%2F%3Fpage%3D2"
        );
    }

    #[test]
    fn found_sets_location() {
        let response = found("/profile/leo/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/profile/leo/"
        );
    }
}
