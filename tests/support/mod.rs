//! Shared harness: an in-memory store behind both routers, with a manual
//! clock driving listing-cache expiry.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use gazette::{
    app::Application,
    application::repos::{
        CreateGroupParams, CreatePostParams, CreateUserParams, GroupsWriteRepo, PostsWriteRepo,
        Repositories, SessionsRepo, UsersRepo,
    },
    cache::{ListingCacheConfig, ManualClock, MemoryListingCache},
    config::Settings,
    domain::entities::{GroupRecord, PostRecord, UserRecord},
    infra::memory::MemoryRepositories,
};

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }

    /// Number of post cards rendered in a listing.
    pub fn card_count(&self) -> usize {
        self.body.matches("class=\"post-card\"").count()
    }
}

pub struct TestApp {
    pub store: Arc<MemoryRepositories>,
    pub clock: Arc<ManualClock>,
    pub app: Application,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let store = Arc::new(MemoryRepositories::new());
        let clock = Arc::new(ManualClock::new());
        let config = ListingCacheConfig::from(&settings.listing_cache);
        let cache = Arc::new(MemoryListingCache::with_clock(&config, clock.clone()));
        let app = Application::with_cache(
            Repositories::from_store(store.clone()),
            None,
            &settings,
            cache,
        );
        Self { store, clock, app }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn user(&self, username: &str) -> UserRecord {
        self.store
            .create_user(CreateUserParams {
                username: username.to_string(),
                display_name: String::new(),
            })
            .await
            .expect("create user")
    }

    pub async fn session(&self, user: &UserRecord) -> String {
        self.store
            .create_session(user.id)
            .await
            .expect("create session")
    }

    pub async fn group(&self, title: &str, slug: &str) -> GroupRecord {
        self.store
            .create_group(CreateGroupParams {
                title: title.to_string(),
                slug: slug.to_string(),
                description: format!("About {title}"),
            })
            .await
            .expect("create group")
    }

    pub async fn post(
        &self,
        author: &UserRecord,
        text: &str,
        group: Option<&GroupRecord>,
    ) -> PostRecord {
        self.store
            .create_post(CreatePostParams {
                author_id: author.id,
                text: text.to_string(),
                group_id: group.map(|group| group.id),
                image: None,
            })
            .await
            .expect("create post")
    }

    pub async fn get(&self, uri: &str, session: Option<&str>) -> TestResponse {
        let request = with_session(Request::get(uri), session)
            .body(Body::empty())
            .expect("request");
        send(&self.app.public, request).await
    }

    pub async fn post_form(&self, uri: &str, form: &str, session: Option<&str>) -> TestResponse {
        let request = with_session(Request::post(uri), session)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .expect("request");
        send(&self.app.public, request).await
    }

    pub async fn admin_post(&self, uri: &str, form: &str) -> TestResponse {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .expect("request");
        send(&self.app.admin, request).await
    }

    pub async fn admin_get(&self, uri: &str) -> TestResponse {
        let request = Request::get(uri).body(Body::empty()).expect("request");
        send(&self.app.admin, request).await
    }
}

fn with_session(
    builder: axum::http::request::Builder,
    session: Option<&str>,
) -> axum::http::request::Builder {
    match session {
        Some(token) => builder.header(header::COOKIE, format!("sessionid={token}")),
        None => builder,
    }
}

async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.expect("router");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    TestResponse {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).expect("utf-8 body"),
    }
}
