use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    /// Following yourself is accepted but never stored.
    SelfFollowIgnored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowOutcome {
    Removed,
    NotFollowing,
}

/// Idempotent management of follow edges.
#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow_author(
        &self,
        follower: &UserRecord,
        username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.find_author(username).await?;
        if author.id == follower.id {
            debug!(
                target = "gazette::application::follow",
                user = %follower.username,
                "ignoring self-follow"
            );
            return Ok(FollowOutcome::SelfFollowIgnored);
        }

        let created = self.follows.create_if_absent(follower.id, author.id).await?;
        Ok(if created {
            FollowOutcome::Created
        } else {
            FollowOutcome::AlreadyFollowing
        })
    }

    pub async fn unfollow_author(
        &self,
        follower: &UserRecord,
        username: &str,
    ) -> Result<UnfollowOutcome, FollowError> {
        let author = self.find_author(username).await?;
        let removed = self
            .follows
            .delete_if_present(follower.id, author.id)
            .await?;
        Ok(if removed {
            UnfollowOutcome::Removed
        } else {
            UnfollowOutcome::NotFollowing
        })
    }

    async fn find_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or(FollowError::UnknownAuthor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::{CreateUserParams, FollowsRepo, UsersRepo};
    use crate::infra::memory::MemoryRepositories;

    async fn setup() -> (FollowService, Arc<MemoryRepositories>, UserRecord, UserRecord) {
        let store = Arc::new(MemoryRepositories::new());
        let reader = store
            .create_user(CreateUserParams {
                username: "reader".to_string(),
                display_name: "Reader".to_string(),
            })
            .await
            .unwrap();
        let author = store
            .create_user(CreateUserParams {
                username: "author".to_string(),
                display_name: "Author".to_string(),
            })
            .await
            .unwrap();
        let service = FollowService::new(store.clone(), store.clone());
        (service, store, reader, author)
    }

    #[tokio::test]
    async fn following_twice_keeps_a_single_edge() {
        let (service, store, reader, author) = setup().await;

        let first = service.follow_author(&reader, "author").await.unwrap();
        let second = service.follow_author(&reader, "author").await.unwrap();

        assert_eq!(first, FollowOutcome::Created);
        assert_eq!(second, FollowOutcome::AlreadyFollowing);
        assert_eq!(store.follow_edge_count().await, 1);
        assert!(store.exists(reader.id, author.id).await.unwrap());
    }

    #[tokio::test]
    async fn self_follow_creates_no_edge() {
        let (service, store, reader, _) = setup().await;

        let outcome = service.follow_author(&reader, "reader").await.unwrap();

        assert_eq!(outcome, FollowOutcome::SelfFollowIgnored);
        assert_eq!(store.follow_edge_count().await, 0);
    }

    #[tokio::test]
    async fn unfollow_without_edge_is_a_no_op() {
        let (service, _, reader, _) = setup().await;

        let outcome = service.unfollow_author(&reader, "author").await.unwrap();
        assert_eq!(outcome, UnfollowOutcome::NotFollowing);
    }

    #[tokio::test]
    async fn unfollow_removes_existing_edge() {
        let (service, store, reader, author) = setup().await;
        service.follow_author(&reader, "author").await.unwrap();

        let outcome = service.unfollow_author(&reader, "author").await.unwrap();

        assert_eq!(outcome, UnfollowOutcome::Removed);
        assert!(!store.exists(reader.id, author.id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_author_is_not_found() {
        let (service, _, reader, _) = setup().await;

        let err = service
            .follow_author(&reader, "ghost")
            .await
            .expect_err("unknown author");
        assert!(matches!(err, FollowError::UnknownAuthor));

        let err = service
            .unfollow_author(&reader, "ghost")
            .await
            .expect_err("unknown author");
        assert!(matches!(err, FollowError::UnknownAuthor));
    }
}
