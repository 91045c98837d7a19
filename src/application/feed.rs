use std::sync::Arc;

use thiserror::Error;

use crate::application::pagination::{Page, PageNumber, Paginator};
use crate::application::repos::{FeedScope, FollowsRepo, GroupsRepo, PostsRepo, RepoError, UsersRepo};
use crate::domain::entities::{GroupRecord, PostRecord, UserRecord};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group")]
    UnknownGroup,
    #[error("unknown author")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<PostRecord>,
}

#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: UserRecord,
    pub page: Page<PostRecord>,
    /// Whether the viewer (if any) already follows `author`.
    pub following: bool,
}

/// Builds the four post listings: global, group, profile and follow.
#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    paginator: Paginator,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        paginator: Paginator,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            paginator,
        }
    }

    pub async fn global_feed(&self, page: PageNumber) -> Result<Page<PostRecord>, FeedError> {
        self.load_page(FeedScope::All, page).await
    }

    pub async fn group_feed(&self, slug: &str, page: PageNumber) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or(FeedError::UnknownGroup)?;
        let page = self.load_page(FeedScope::Group(group.id), page).await?;
        Ok(GroupFeed { group, page })
    }

    pub async fn profile_feed(
        &self,
        username: &str,
        viewer: Option<&UserRecord>,
        page: PageNumber,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self.find_author(username).await?;
        let page = self.load_page(FeedScope::Author(author.id), page).await?;
        let following = self.is_followed_by_viewer(viewer, &author.username).await?;
        Ok(ProfileFeed {
            author,
            page,
            following,
        })
    }

    /// Posts by every author `viewer` follows. Callers must have authenticated the viewer.
    pub async fn follow_feed(
        &self,
        viewer: &UserRecord,
        page: PageNumber,
    ) -> Result<Page<PostRecord>, FeedError> {
        self.load_page(FeedScope::FollowedBy(viewer.id), page).await
    }

    /// `false` for anonymous viewers; unknown authors are still reported.
    pub async fn is_followed_by_viewer(
        &self,
        viewer: Option<&UserRecord>,
        username: &str,
    ) -> Result<bool, FeedError> {
        let author = self.find_author(username).await?;
        match viewer {
            Some(viewer) => Ok(self.follows.exists(viewer.id, author.id).await?),
            None => Ok(false),
        }
    }

    async fn find_author(&self, username: &str) -> Result<UserRecord, FeedError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or(FeedError::UnknownAuthor)
    }

    async fn load_page(
        &self,
        scope: FeedScope,
        page: PageNumber,
    ) -> Result<Page<PostRecord>, FeedError> {
        let Some(window) = self.paginator.window(page) else {
            let total = self.posts.count_posts(scope).await?;
            return Ok(self.paginator.page(Vec::new(), total, page));
        };

        let slice = self.posts.list_posts(scope, window).await?;
        Ok(self.paginator.page(slice.items, slice.total, page))
    }
}
