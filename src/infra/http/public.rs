use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    application::{
        error::HttpError,
        feed::FeedError,
        follow::FollowError,
        pagination::PageQuery,
        posts::{DeleteOutcome, EditOutcome, PostDraft, PostError},
    },
    cache::listing_cache_layer,
    domain::entities::{GroupRecord, UserRecord},
    presentation::views::{
        CommentView, FollowTemplate, GroupTemplate, IndexTemplate, LayoutView, ListingView,
        PostCard, PostDetailTemplate, PostFormTemplate, ProfileTemplate, ProfileView,
        profile_path, render_not_found_response, render_template_response,
    },
};

use super::{
    HttpState,
    auth::{AuthUser, Viewer, found, resolve_viewer},
    middleware::{log_responses, set_request_context},
};

pub fn build_router(state: HttpState) -> Router {
    let cached_routes = Router::new().route("/", get(index)).route_layer(
        middleware::from_fn_with_state(state.listing_cache.clone(), listing_cache_layer),
    );

    let routes = Router::new()
        .route("/group/{slug}/", get(group_index))
        .route("/profile/{username}/", get(profile))
        .route("/profile/{username}/follow/", get(profile_follow))
        .route("/profile/{username}/unfollow/", get(profile_unfollow))
        .route("/follow/", get(follow_index))
        .route("/create/", get(post_create_form).post(post_create))
        .route("/posts/{post_id}/", get(post_detail))
        .route(
            "/posts/{post_id}/edit/",
            get(post_edit_form).post(post_edit),
        )
        .route("/posts/{post_id}/delete/", post(post_delete))
        .route("/posts/{post_id}/comment/", post(add_comment))
        .fallback(fallback_router);

    cached_routes
        .merge(routes)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, resolve_viewer))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostForm {
    text: String,
    group: String,
    image: String,
}

impl PostForm {
    /// `None` for the empty option; an unparsable id is reported like an unknown group.
    fn draft(&self) -> Result<PostDraft, PostError> {
        let group = self.group.trim();
        let group_id = if group.is_empty() {
            None
        } else {
            Some(Uuid::parse_str(group).map_err(|_| PostError::UnknownGroup)?)
        };
        Ok(PostDraft {
            text: self.text.clone(),
            group_id,
            image: Some(self.image.clone()),
        })
    }

    fn selected_group(&self) -> Option<Uuid> {
        Uuid::parse_str(self.group.trim()).ok()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommentForm {
    text: String,
}

async fn index(
    State(state): State<HttpState>,
    viewer: Viewer,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.feed.global_feed(query.number()).await {
        Ok(page) => render_template_response(
            IndexTemplate {
                layout: LayoutView::new("Latest posts", viewer.user()),
                listing: ListingView::new(&page, "/"),
            },
            StatusCode::OK,
        ),
        Err(err) => feed_error_to_response(err, viewer.user()),
    }
}

async fn group_index(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.feed.group_feed(&slug, query.number()).await {
        Ok(feed) => {
            let listing = ListingView::new(&feed.page, &format!("/group/{slug}/"));
            let layout = LayoutView::new(feed.group.title.clone(), viewer.user());
            render_template_response(
                GroupTemplate::new(layout, &feed.group, listing),
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response(err, viewer.user()),
    }
}

async fn profile(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state
        .feed
        .profile_feed(&username, viewer.user(), query.number())
        .await
    {
        Ok(feed) => {
            let can_follow = viewer
                .user()
                .is_some_and(|user| user.id != feed.author.id);
            let path = profile_path(&feed.author.username);
            let listing = ListingView::new(&feed.page, &path);
            let profile = ProfileView {
                path,
                name: feed.author.byline().to_string(),
                post_count: feed.page.total_count,
                can_follow,
                following: feed.following,
            };
            render_template_response(
                ProfileTemplate {
                    layout: LayoutView::new(profile.name.clone(), viewer.user()),
                    profile,
                    listing,
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response(err, viewer.user()),
    }
}

async fn follow_index(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.feed.follow_feed(&user, query.number()).await {
        Ok(page) => render_template_response(
            FollowTemplate {
                layout: LayoutView::new("Following", Some(&user)),
                listing: ListingView::new(&page, "/follow/"),
            },
            StatusCode::OK,
        ),
        Err(err) => feed_error_to_response(err, Some(&user)),
    }
}

async fn profile_follow(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    Path(username): Path<String>,
) -> Response {
    match state.follow.follow_author(&user, &username).await {
        Ok(_) => found(&profile_path(&username)),
        Err(FollowError::UnknownAuthor) => {
            render_not_found_response(LayoutView::new("Not found", Some(&user)))
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn profile_unfollow(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    Path(username): Path<String>,
) -> Response {
    match state.follow.unfollow_author(&user, &username).await {
        Ok(_) => found(&profile_path(&username)),
        Err(FollowError::UnknownAuthor) => {
            render_not_found_response(LayoutView::new("Not found", Some(&user)))
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(post_id): Path<String>,
) -> Response {
    let Some(id) = parse_post_id(&post_id) else {
        return not_found(viewer.user());
    };

    match state.posts.post_detail(id).await {
        Ok(detail) => {
            let is_author = viewer
                .user()
                .is_some_and(|user| detail.post.is_authored_by(user.id));
            let post = PostCard::from(&detail.post);
            render_template_response(
                PostDetailTemplate {
                    layout: LayoutView::new(post.label.clone(), viewer.user()),
                    post,
                    author_post_count: detail.author_post_count,
                    comments: detail.comments.iter().map(CommentView::from).collect(),
                    can_comment: viewer.user().is_some(),
                    is_author,
                },
                StatusCode::OK,
            )
        }
        Err(err) => post_error_to_response(err, viewer.user()),
    }
}

async fn post_create_form(State(state): State<HttpState>, AuthUser(user): AuthUser) -> Response {
    match state.posts.list_groups().await {
        Ok(groups) => render_post_form(
            &user,
            "/create/".to_string(),
            false,
            &PostForm::default(),
            &groups,
            None,
        ),
        Err(err) => post_error_to_response(err, Some(&user)),
    }
}

async fn post_create(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    Form(form): Form<PostForm>,
) -> Response {
    let result = match form.draft() {
        Ok(draft) => state.posts.create_post(&user, draft).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(_) => found(&profile_path(&user.username)),
        Err(err @ (PostError::Validation(_) | PostError::UnknownGroup)) => {
            rerender_post_form(&state, &user, "/create/".to_string(), false, &form, err).await
        }
        Err(err) => post_error_to_response(err, Some(&user)),
    }
}

async fn post_edit_form(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    Path(post_id): Path<String>,
) -> Response {
    let Some(id) = parse_post_id(&post_id) else {
        return not_found(Some(&user));
    };

    let post = match state.posts.editable_post(&user, id).await {
        Ok(Some(post)) => post,
        Ok(None) => return found(&format!("/posts/{id}/")),
        Err(err) => return post_error_to_response(err, Some(&user)),
    };

    match state.posts.list_groups().await {
        Ok(groups) => {
            let form = PostForm {
                text: post.text.clone(),
                group: post
                    .group
                    .as_ref()
                    .map(|group| group.id.to_string())
                    .unwrap_or_default(),
                image: post.image.clone().unwrap_or_default(),
            };
            render_post_form(
                &user,
                format!("/posts/{id}/edit/"),
                true,
                &form,
                &groups,
                None,
            )
        }
        Err(err) => post_error_to_response(err, Some(&user)),
    }
}

async fn post_edit(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    Path(post_id): Path<String>,
    Form(form): Form<PostForm>,
) -> Response {
    let Some(id) = parse_post_id(&post_id) else {
        return not_found(Some(&user));
    };

    let result = match form.draft() {
        Ok(draft) => state.posts.edit_post(&user, id, draft).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(EditOutcome::Updated(post)) => found(&format!("/posts/{}/", post.id)),
        Ok(EditOutcome::NotAuthor) => found(&format!("/posts/{id}/")),
        Err(err @ (PostError::Validation(_) | PostError::UnknownGroup)) => {
            rerender_post_form(&state, &user, format!("/posts/{id}/edit/"), true, &form, err).await
        }
        Err(err) => post_error_to_response(err, Some(&user)),
    }
}

async fn post_delete(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    Path(post_id): Path<String>,
) -> Response {
    let Some(id) = parse_post_id(&post_id) else {
        return not_found(Some(&user));
    };

    match state.posts.delete_post(&user, id).await {
        Ok(DeleteOutcome::Deleted) => found(&profile_path(&user.username)),
        Ok(DeleteOutcome::NotAuthor) => found(&format!("/posts/{id}/")),
        Err(err) => post_error_to_response(err, Some(&user)),
    }
}

async fn add_comment(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    Path(post_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Response {
    let Some(id) = parse_post_id(&post_id) else {
        return not_found(Some(&user));
    };

    match state.posts.add_comment(&user, id, &form.text).await {
        Ok(_) => found(&format!("/posts/{id}/")),
        Err(err) => post_error_to_response(err, Some(&user)),
    }
}

async fn fallback_router(viewer: Viewer) -> Response {
    not_found(viewer.user())
}

fn parse_post_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

fn not_found(viewer: Option<&UserRecord>) -> Response {
    render_not_found_response(LayoutView::new("Not found", viewer))
}

fn render_post_form(
    user: &UserRecord,
    action: String,
    is_edit: bool,
    form: &PostForm,
    groups: &[GroupRecord],
    error: Option<String>,
) -> Response {
    let title = if is_edit { "Edit post" } else { "New post" };
    render_template_response(
        PostFormTemplate {
            layout: LayoutView::new(title, Some(user)),
            action,
            is_edit,
            text: form.text.clone(),
            image: form.image.clone(),
            groups: PostFormTemplate::group_options(groups, form.selected_group()),
            error,
        },
        StatusCode::OK,
    )
}

async fn rerender_post_form(
    state: &HttpState,
    user: &UserRecord,
    action: String,
    is_edit: bool,
    form: &PostForm,
    err: PostError,
) -> Response {
    match state.posts.list_groups().await {
        Ok(groups) => render_post_form(
            user,
            action,
            is_edit,
            form,
            &groups,
            Some(err.to_string()),
        ),
        Err(err) => post_error_to_response(err, Some(user)),
    }
}

fn feed_error_to_response(err: FeedError, viewer: Option<&UserRecord>) -> Response {
    match err {
        FeedError::UnknownGroup | FeedError::UnknownAuthor => not_found(viewer),
        other => HttpError::from(other).into_response(),
    }
}

fn post_error_to_response(err: PostError, viewer: Option<&UserRecord>) -> Response {
    match err {
        PostError::UnknownPost => not_found(viewer),
        other => HttpError::from(other).into_response(),
    }
}
