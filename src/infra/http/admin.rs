//! Operator surface, served on its own listener.
//!
//! Besides the health probe and the listing-cache flush, it carries the
//! account, session and group hooks used to seed a store without the
//! excluded authentication and admin UI layers.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Form, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    application::{
        error::{ErrorReport, HttpError, repo_error_to_http},
        repos::{
            CreateGroupParams, CreateUserParams, GroupsRepo, GroupsWriteRepo, Repositories,
            SessionsRepo, UsersRepo,
        },
    },
    cache::ListingCacheState,
    domain::{
        slug::{generate_unique_slug, validate_slug},
        users::normalize_username,
    },
    infra::db::PostgresRepositories,
};

use super::{db_health_response, middleware::log_responses};

#[derive(Clone)]
pub struct AdminState {
    /// `None` when running on the in-memory store.
    pub db: Option<PostgresRepositories>,
    pub listing_cache: ListingCacheState,
    pub users: Arc<dyn UsersRepo>,
    pub sessions: Arc<dyn SessionsRepo>,
    pub groups: Arc<dyn GroupsRepo>,
    pub groups_write: Arc<dyn GroupsWriteRepo>,
}

impl AdminState {
    pub fn new(
        repositories: &Repositories,
        db: Option<PostgresRepositories>,
        listing_cache: ListingCacheState,
    ) -> Self {
        Self {
            db,
            listing_cache,
            users: repositories.users.clone(),
            sessions: repositories.sessions.clone(),
            groups: repositories.groups.clone(),
            groups_write: repositories.groups_write.clone(),
        }
    }
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/_health/db", get(admin_health))
        .route("/cache/listing/clear", post(clear_listing_cache))
        .route("/users", post(create_user))
        .route("/sessions", post(create_session))
        .route("/groups", post(create_group))
        .route("/groups/{slug}/delete", post(delete_group))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
}

async fn admin_health(State(state): State<AdminState>) -> Response {
    match &state.db {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn clear_listing_cache(State(state): State<AdminState>) -> Response {
    match state.listing_cache.clear() {
        Ok(()) => {
            info!(target = "gazette::http::admin", "listing cache cleared");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            warn!(
                target = "gazette::http::admin",
                error = %err,
                "listing cache clear failed"
            );
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::admin::clear_listing_cache",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserForm {
    username: String,
    display_name: String,
}

/// Responds 201 with the new account id.
async fn create_user(
    State(state): State<AdminState>,
    Form(form): Form<UserForm>,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::admin::create_user";

    let username = normalize_username(&form.username).map_err(|err| {
        HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid username", &err)
    })?;

    let user = state
        .users
        .create_user(CreateUserParams {
            username,
            display_name: form.display_name.trim().to_string(),
        })
        .await
        .map_err(|err| repo_error_to_http(SOURCE, &err))?;

    Ok((StatusCode::CREATED, user.id.to_string()).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SessionForm {
    username: String,
}

/// Issue a session key for an existing account. Responds 201 with the key,
/// which is the value of the `sessionid` cookie.
async fn create_session(
    State(state): State<AdminState>,
    Form(form): Form<SessionForm>,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::admin::create_session";

    let user = state
        .users
        .find_by_username(form.username.trim())
        .await
        .map_err(|err| repo_error_to_http(SOURCE, &err))?
        .ok_or_else(|| {
            HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Unknown user",
                "username did not match any account",
            )
        })?;

    let token = state
        .sessions
        .create_session(user.id)
        .await
        .map_err(|err| repo_error_to_http(SOURCE, &err))?;

    Ok((StatusCode::CREATED, token).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GroupForm {
    title: String,
    slug: String,
    description: String,
}

/// Responds 201 with the group's slug, derived from the title when none is given.
async fn create_group(
    State(state): State<AdminState>,
    Form(form): Form<GroupForm>,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::admin::create_group";

    let title = form.title.trim();
    if title.is_empty() {
        return Err(HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid group",
            "title must not be empty",
        ));
    }

    let requested = form.slug.trim();
    let slug = if requested.is_empty() {
        let taken: HashSet<String> = state
            .groups
            .list_groups()
            .await
            .map_err(|err| repo_error_to_http(SOURCE, &err))?
            .into_iter()
            .map(|group| group.slug)
            .collect();
        generate_unique_slug(title, |candidate| !taken.contains(candidate)).map_err(|err| {
            HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid group", &err)
        })?
    } else {
        validate_slug(requested).map_err(|err| {
            HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid group", &err)
        })?;
        requested.to_string()
    };

    let group = state
        .groups_write
        .create_group(CreateGroupParams {
            title: title.to_string(),
            slug,
            description: form.description.trim().to_string(),
        })
        .await
        .map_err(|err| repo_error_to_http(SOURCE, &err))?;

    Ok((StatusCode::CREATED, group.slug).into_response())
}

async fn delete_group(
    State(state): State<AdminState>,
    Path(slug): Path<String>,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::admin::delete_group";

    let group = state
        .groups
        .find_by_slug(&slug)
        .await
        .map_err(|err| repo_error_to_http(SOURCE, &err))?
        .ok_or_else(|| {
            HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Unknown group",
                "slug did not match any group",
            )
        })?;

    state
        .groups_write
        .delete_group(group.id)
        .await
        .map_err(|err| repo_error_to_http(SOURCE, &err))?;

    Ok(StatusCode::NO_CONTENT.into_response())
}
