//! In-process entity store.
//!
//! Used when no database URL is configured and by the test suites. All tables
//! live behind one lock so a listing's count and slice come from the same
//! snapshot, and references are resolved at read time the way a join would.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::pagination::LimitOffset;
use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateUserParams,
    FeedScope, FollowsRepo, GroupsRepo, GroupsWriteRepo, PostSlice, PostsRepo, PostsWriteRepo,
    RepoError, SessionsRepo, UpdatePostParams, UsersRepo,
};
use crate::domain::entities::{
    AuthorRef, CommentRecord, FollowRecord, GroupRecord, GroupRef, PostRecord, UserRecord,
};

#[derive(Debug, Clone)]
struct StoredPost {
    id: Uuid,
    seq: u64,
    text: String,
    created_at: OffsetDateTime,
    author_id: Uuid,
    group_id: Option<Uuid>,
    image: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredComment {
    id: Uuid,
    seq: u64,
    post_id: Uuid,
    author_id: Uuid,
    text: String,
    created_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct Tables {
    seq: u64,
    users: HashMap<Uuid, UserRecord>,
    sessions: HashMap<String, Uuid>,
    groups: HashMap<Uuid, GroupRecord>,
    posts: HashMap<Uuid, StoredPost>,
    comments: HashMap<Uuid, StoredComment>,
    follows: Vec<FollowRecord>,
}

impl Tables {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn author_ref(&self, id: Uuid) -> Result<AuthorRef, RepoError> {
        self.users
            .get(&id)
            .map(AuthorRef::from)
            .ok_or_else(|| RepoError::Integrity {
                message: format!("user {id} referenced but missing"),
            })
    }

    fn hydrate(&self, post: &StoredPost) -> Result<PostRecord, RepoError> {
        Ok(PostRecord {
            id: post.id,
            text: post.text.clone(),
            created_at: post.created_at,
            author: self.author_ref(post.author_id)?,
            group: post
                .group_id
                .and_then(|id| self.groups.get(&id))
                .map(GroupRef::from),
            image: post.image.clone(),
        })
    }

    fn in_scope(&self, post: &StoredPost, scope: FeedScope) -> bool {
        match scope {
            FeedScope::All => true,
            FeedScope::Group(group_id) => post.group_id == Some(group_id),
            FeedScope::Author(author_id) => post.author_id == author_id,
            FeedScope::FollowedBy(follower_id) => self
                .follows
                .iter()
                .any(|edge| edge.follower_id == follower_id && edge.author_id == post.author_id),
        }
    }

    /// Posts in scope, newest first; ties broken by insertion order.
    fn scoped(&self, scope: FeedScope) -> Vec<&StoredPost> {
        let mut posts: Vec<&StoredPost> = self
            .posts
            .values()
            .filter(|post| self.in_scope(post, scope))
            .collect();
        posts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        posts
    }

    fn ensure_user(&self, id: Uuid) -> Result<(), RepoError> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(RepoError::InvalidInput {
                message: format!("user {id} does not exist"),
            })
        }
    }

    fn ensure_group(&self, id: Option<Uuid>) -> Result<(), RepoError> {
        match id {
            Some(id) if !self.groups.contains_key(&id) => Err(RepoError::InvalidInput {
                message: format!("group {id} does not exist"),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryRepositories {
    tables: RwLock<Tables>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn follow_edge_count(&self) -> usize {
        self.tables.read().await.follows.len()
    }
}

#[async_trait]
impl UsersRepo for MemoryRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|user| user.username == params.username)
        {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }

        let user = UserRecord {
            id: Uuid::new_v4(),
            username: params.username,
            display_name: params.display_name,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl SessionsRepo for MemoryRepositories {
    async fn find_user_by_session(&self, token: &str) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .get(token)
            .and_then(|user_id| tables.users.get(user_id))
            .cloned())
    }

    async fn create_session(&self, user_id: Uuid) -> Result<String, RepoError> {
        let mut tables = self.tables.write().await;
        tables.ensure_user(user_id)?;
        let token = Uuid::new_v4().simple().to_string();
        tables.sessions.insert(token.clone(), user_id);
        Ok(token)
    }
}

#[async_trait]
impl GroupsRepo for MemoryRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self.tables.read().await.groups.get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables
            .groups
            .values()
            .find(|group| group.slug == slug)
            .cloned())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let tables = self.tables.read().await;
        let mut groups: Vec<GroupRecord> = tables.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }
}

#[async_trait]
impl GroupsWriteRepo for MemoryRepositories {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut tables = self.tables.write().await;
        if tables.groups.values().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }

        let group = GroupRecord {
            id: Uuid::new_v4(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        tables.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn delete_group(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tables = self.tables.write().await;
        if tables.groups.remove(&id).is_none() {
            return Err(RepoError::NotFound);
        }
        for post in tables.posts.values_mut() {
            if post.group_id == Some(id) {
                post.group_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PostsRepo for MemoryRepositories {
    async fn list_posts(
        &self,
        scope: FeedScope,
        window: LimitOffset,
    ) -> Result<PostSlice, RepoError> {
        let tables = self.tables.read().await;
        let scoped = tables.scoped(scope);
        let total = scoped.len() as u64;

        let items = scoped
            .into_iter()
            .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
            .map(|post| tables.hydrate(post))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PostSlice { items, total })
    }

    async fn count_posts(&self, scope: FeedScope) -> Result<u64, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables
            .posts
            .values()
            .filter(|post| tables.in_scope(post, scope))
            .count() as u64)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let tables = self.tables.read().await;
        tables
            .posts
            .get(&id)
            .map(|post| tables.hydrate(post))
            .transpose()
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.write().await;
        tables.ensure_user(params.author_id)?;
        tables.ensure_group(params.group_id)?;

        let post = StoredPost {
            id: Uuid::new_v4(),
            seq: tables.next_seq(),
            text: params.text,
            created_at: OffsetDateTime::now_utc(),
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
        };
        let record = tables.hydrate(&post)?;
        tables.posts.insert(post.id, post);
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.write().await;
        tables.ensure_group(params.group_id)?;

        let post = tables.posts.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        let post = post.clone();
        tables.hydrate(&post)
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tables = self.tables.write().await;
        if tables.posts.remove(&id).is_none() {
            return Err(RepoError::NotFound);
        }
        tables.comments.retain(|_, comment| comment.post_id != id);
        Ok(())
    }
}

#[async_trait]
impl FollowsRepo for MemoryRepositories {
    async fn exists(&self, follower_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables
            .follows
            .iter()
            .any(|edge| edge.follower_id == follower_id && edge.author_id == author_id))
    }

    async fn create_if_absent(
        &self,
        follower_id: Uuid,
        author_id: Uuid,
    ) -> Result<bool, RepoError> {
        let mut tables = self.tables.write().await;
        tables.ensure_user(follower_id)?;
        tables.ensure_user(author_id)?;
        if tables
            .follows
            .iter()
            .any(|edge| edge.follower_id == follower_id && edge.author_id == author_id)
        {
            return Ok(false);
        }

        tables.follows.push(FollowRecord {
            follower_id,
            author_id,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(true)
    }

    async fn delete_if_present(
        &self,
        follower_id: Uuid,
        author_id: Uuid,
    ) -> Result<bool, RepoError> {
        let mut tables = self.tables.write().await;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|edge| !(edge.follower_id == follower_id && edge.author_id == author_id));
        Ok(tables.follows.len() != before)
    }
}

#[async_trait]
impl CommentsRepo for MemoryRepositories {
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let tables = self.tables.read().await;
        let mut comments: Vec<&StoredComment> = tables
            .comments
            .values()
            .filter(|comment| comment.post_id == post_id)
            .collect();
        comments.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.seq.cmp(&b.seq))
        });

        comments
            .into_iter()
            .map(|comment| {
                Ok(CommentRecord {
                    id: comment.id,
                    post_id: comment.post_id,
                    author: tables.author_ref(comment.author_id)?,
                    text: comment.text.clone(),
                    created_at: comment.created_at,
                })
            })
            .collect()
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&params.post_id) {
            return Err(RepoError::NotFound);
        }
        tables.ensure_user(params.author_id)?;

        let comment = StoredComment {
            id: Uuid::new_v4(),
            seq: tables.next_seq(),
            post_id: params.post_id,
            author_id: params.author_id,
            text: params.text,
            created_at: OffsetDateTime::now_utc(),
        };
        let record = CommentRecord {
            id: comment.id,
            post_id: comment.post_id,
            author: tables.author_ref(comment.author_id)?,
            text: comment.text.clone(),
            created_at: comment.created_at,
        };
        tables.comments.insert(comment.id, comment);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user(store: &MemoryRepositories, name: &str) -> UserRecord {
        store
            .create_user(CreateUserParams {
                username: name.to_string(),
                display_name: String::new(),
            })
            .await
            .unwrap()
    }

    async fn post(store: &MemoryRepositories, author: &UserRecord, group: Option<Uuid>) -> PostRecord {
        store
            .create_post(CreatePostParams {
                author_id: author.id,
                text: "text".to_string(),
                group_id: group,
                image: None,
            })
            .await
            .unwrap()
    }

    const ALL: LimitOffset = LimitOffset {
        limit: 100,
        offset: 0,
    };

    #[tokio::test]
    async fn listings_are_newest_first() {
        let store = MemoryRepositories::new();
        let author = user(&store, "a").await;
        let first = post(&store, &author, None).await;
        let second = post(&store, &author, None).await;

        let slice = store.list_posts(FeedScope::All, ALL).await.unwrap();
        let ids: Vec<Uuid> = slice.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(slice.total, 2);
    }

    #[tokio::test]
    async fn deleting_group_keeps_posts() {
        let store = MemoryRepositories::new();
        let author = user(&store, "a").await;
        let group = store
            .create_group(CreateGroupParams {
                title: "G".to_string(),
                slug: "g".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        let created = post(&store, &author, Some(group.id)).await;
        assert!(created.group.is_some());

        store.delete_group(group.id).await.unwrap();

        let found = PostsRepo::find_by_id(&store, created.id)
            .await
            .unwrap()
            .expect("post survives");
        assert!(found.group.is_none());
        assert_eq!(
            store.count_posts(FeedScope::Group(group.id)).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn deleting_post_removes_its_comments() {
        let store = MemoryRepositories::new();
        let author = user(&store, "a").await;
        let created = post(&store, &author, None).await;
        store
            .create_comment(CreateCommentParams {
                post_id: created.id,
                author_id: author.id,
                text: "hi".to_string(),
            })
            .await
            .unwrap();

        store.delete_post(created.id).await.unwrap();

        assert!(store.list_for_post(created.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn follow_scope_only_includes_followed_authors() {
        let store = MemoryRepositories::new();
        let reader = user(&store, "reader").await;
        let followed = user(&store, "followed").await;
        let stranger = user(&store, "stranger").await;
        let wanted = post(&store, &followed, None).await;
        post(&store, &stranger, None).await;

        store.create_if_absent(reader.id, followed.id).await.unwrap();

        let slice = store
            .list_posts(FeedScope::FollowedBy(reader.id), ALL)
            .await
            .unwrap();
        assert_eq!(slice.total, 1);
        assert_eq!(slice.items[0].id, wanted.id);
    }

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let store = MemoryRepositories::new();
        user(&store, "dup").await;
        let err = store
            .create_user(CreateUserParams {
                username: "dup".to_string(),
                display_name: String::new(),
            })
            .await
            .expect_err("duplicate");
        assert!(matches!(err, RepoError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn sessions_resolve_to_users() {
        let store = MemoryRepositories::new();
        let author = user(&store, "a").await;
        let token = store.create_session(author.id).await.unwrap();

        let resolved = store.find_user_by_session(&token).await.unwrap();
        assert_eq!(resolved.map(|u| u.id), Some(author.id));
        assert!(store.find_user_by_session("bogus").await.unwrap().is_none());
    }
}
