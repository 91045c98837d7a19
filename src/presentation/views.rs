use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::Page;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use crate::domain::posts::post_label;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, macros::format_description};

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(layout: LayoutView) -> Response {
    let mut response = render_template_response(
        ErrorTemplate {
            layout,
            content: ErrorPageView::not_found(),
        },
        StatusCode::NOT_FOUND,
    );
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Path of a profile page with the username percent-encoded as one segment.
pub fn profile_path(username: &str) -> String {
    let segment: String = url::form_urlencoded::byte_serialize(username.as_bytes()).collect();
    format!("/profile/{segment}/")
}

#[derive(Clone, Debug)]
pub struct ViewerLink {
    pub username: String,
    pub profile_path: String,
}

/// Page chrome shared by every template. `viewer` makes rendered output
/// specific to the signed-in account.
#[derive(Clone, Debug)]
pub struct LayoutView {
    pub title: String,
    pub viewer: Option<ViewerLink>,
}

impl LayoutView {
    pub fn new(title: impl Into<String>, viewer: Option<&UserRecord>) -> Self {
        Self {
            title: title.into(),
            viewer: viewer.map(|user| ViewerLink {
                username: user.username.clone(),
                profile_path: profile_path(&user.username),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GroupLink {
    pub slug: String,
    pub title: String,
}

#[derive(Clone, Debug)]
pub struct PostCard {
    pub id: String,
    pub label: String,
    pub text: String,
    pub author_path: String,
    pub author_name: String,
    pub group: Option<GroupLink>,
    pub image: Option<String>,
    pub published: String,
}

impl From<&PostRecord> for PostCard {
    fn from(post: &PostRecord) -> Self {
        let author_name = if post.author.display_name.trim().is_empty() {
            post.author.username.clone()
        } else {
            post.author.display_name.clone()
        };
        Self {
            id: post.id.to_string(),
            label: post_label(&post.text),
            text: post.text.clone(),
            author_path: profile_path(&post.author.username),
            author_name,
            group: post.group.as_ref().map(|group| GroupLink {
                slug: group.slug.clone(),
                title: group.title.clone(),
            }),
            image: post.image.clone(),
            published: format_timestamp(post.created_at),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PaginatorView {
    pub number: i64,
    pub total_pages: u64,
    pub total_count: u64,
    pub prev_href: Option<String>,
    pub next_href: Option<String>,
}

impl PaginatorView {
    pub fn from_page<T>(page: &Page<T>, base_path: &str) -> Self {
        Self {
            number: page.number,
            total_pages: page.total_pages,
            total_count: page.total_count,
            prev_href: page
                .prev_number()
                .map(|number| format!("{base_path}?page={number}")),
            next_href: page
                .next_number()
                .map(|number| format!("{base_path}?page={number}")),
        }
    }
}

/// Cards plus navigation for one page of a listing.
#[derive(Clone, Debug)]
pub struct ListingView {
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

impl ListingView {
    pub fn new(page: &Page<PostRecord>, base_path: &str) -> Self {
        Self {
            posts: page.items.iter().map(PostCard::from).collect(),
            paginator: PaginatorView::from_page(page, base_path),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub layout: LayoutView,
    pub listing: ListingView,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub layout: LayoutView,
    pub listing: ListingView,
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub layout: LayoutView,
    pub title: String,
    pub description: String,
    pub listing: ListingView,
}

impl GroupTemplate {
    pub fn new(layout: LayoutView, group: &GroupRecord, listing: ListingView) -> Self {
        Self {
            layout,
            title: group.title.clone(),
            description: group.description.clone(),
            listing,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProfileView {
    pub path: String,
    pub name: String,
    pub post_count: u64,
    /// Whether a follow/unfollow control is shown at all.
    pub can_follow: bool,
    pub following: bool,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub layout: LayoutView,
    pub profile: ProfileView,
    pub listing: ListingView,
}

#[derive(Clone, Debug)]
pub struct CommentView {
    pub author_username: String,
    pub author_path: String,
    pub text: String,
    pub published: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            author_username: comment.author.username.clone(),
            author_path: profile_path(&comment.author.username),
            text: comment.text.clone(),
            published: format_timestamp(comment.created_at),
        }
    }
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub layout: LayoutView,
    pub post: PostCard,
    pub author_post_count: u64,
    pub comments: Vec<CommentView>,
    pub can_comment: bool,
    pub is_author: bool,
}

#[derive(Clone, Debug)]
pub struct GroupOption {
    pub id: String,
    pub title: String,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub layout: LayoutView,
    pub action: String,
    pub is_edit: bool,
    pub text: String,
    pub image: String,
    pub groups: Vec<GroupOption>,
    pub error: Option<String>,
}

impl PostFormTemplate {
    pub fn group_options(groups: &[GroupRecord], selected: Option<uuid::Uuid>) -> Vec<GroupOption> {
        groups
            .iter()
            .map(|group| GroupOption {
                id: group.id.to_string(),
                title: group.title.clone(),
                selected: Some(group.id) == selected,
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct ErrorPageView {
    pub status_code: u16,
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            status_code: 404,
            title: "Page not found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub layout: LayoutView,
    pub content: ErrorPageView,
}

fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[day] [month repr:short] [year] [hour]:[minute]"
    ))
    .unwrap_or_else(|_| at.unix_timestamp().to_string())
}
