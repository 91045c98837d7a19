//! Post detail, authoring and comments.
//!
//! None of these operations touch the listing cache: cached listings are
//! allowed to go stale until their entry expires.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, FeedScope, GroupsRepo, PostsRepo,
    PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use crate::domain::error::DomainError;
use crate::domain::posts::{normalize_comment_text, normalize_image, normalize_post_text};

#[derive(Debug, Error)]
pub enum PostError {
    #[error("unknown post")]
    UnknownPost,
    #[error("unknown group")]
    UnknownGroup,
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Author-supplied fields of a post.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub text: String,
    pub group_id: Option<Uuid>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostRecord,
    pub comments: Vec<CommentRecord>,
    pub author_post_count: u64,
}

#[derive(Debug, Clone)]
pub enum EditOutcome {
    Updated(PostRecord),
    /// The editor does not own the post; the boundary sends them to its detail page.
    NotAuthor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotAuthor,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            writer,
            groups,
            comments,
        }
    }

    pub async fn post_detail(&self, id: Uuid) -> Result<PostDetail, PostError> {
        let post = self.find_post(id).await?;
        let comments = self.comments.list_for_post(post.id).await?;
        let author_post_count = self
            .posts
            .count_posts(FeedScope::Author(post.author.id))
            .await?;
        Ok(PostDetail {
            post,
            comments,
            author_post_count,
        })
    }

    /// Load a post for its edit form, or `None` when `editor` is not its author.
    pub async fn editable_post(
        &self,
        editor: &UserRecord,
        id: Uuid,
    ) -> Result<Option<PostRecord>, PostError> {
        let post = self.find_post(id).await?;
        Ok(post.is_authored_by(editor.id).then_some(post))
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupRecord>, PostError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn create_post(
        &self,
        author: &UserRecord,
        draft: PostDraft,
    ) -> Result<PostRecord, PostError> {
        let text = normalize_post_text(&draft.text)?;
        self.ensure_group(draft.group_id).await?;

        let post = self
            .writer
            .create_post(CreatePostParams {
                author_id: author.id,
                text,
                group_id: draft.group_id,
                image: normalize_image(draft.image.as_deref()),
            })
            .await?;

        info!(
            target = "gazette::application::posts",
            post_id = %post.id,
            author = %author.username,
            "post created"
        );
        Ok(post)
    }

    pub async fn edit_post(
        &self,
        editor: &UserRecord,
        id: Uuid,
        draft: PostDraft,
    ) -> Result<EditOutcome, PostError> {
        let post = self.find_post(id).await?;
        if !post.is_authored_by(editor.id) {
            return Ok(EditOutcome::NotAuthor);
        }

        let text = normalize_post_text(&draft.text)?;
        self.ensure_group(draft.group_id).await?;

        // A blank image field keeps the current image.
        let image = normalize_image(draft.image.as_deref()).or(post.image);
        let updated = self
            .writer
            .update_post(UpdatePostParams {
                id: post.id,
                text,
                group_id: draft.group_id,
                image,
            })
            .await
            .map_err(not_found_as_unknown_post)?;
        Ok(EditOutcome::Updated(updated))
    }

    pub async fn delete_post(
        &self,
        editor: &UserRecord,
        id: Uuid,
    ) -> Result<DeleteOutcome, PostError> {
        let post = self.find_post(id).await?;
        if !post.is_authored_by(editor.id) {
            return Ok(DeleteOutcome::NotAuthor);
        }

        self.writer
            .delete_post(post.id)
            .await
            .map_err(not_found_as_unknown_post)?;
        info!(
            target = "gazette::application::posts",
            post_id = %post.id,
            "post deleted"
        );
        Ok(DeleteOutcome::Deleted)
    }

    /// Attach a comment. Blank text is dropped without creating anything.
    pub async fn add_comment(
        &self,
        author: &UserRecord,
        post_id: Uuid,
        text: &str,
    ) -> Result<Option<CommentRecord>, PostError> {
        let post = self.find_post(post_id).await?;
        let Some(text) = normalize_comment_text(text) else {
            return Ok(None);
        };

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                text,
            })
            .await
            .map_err(not_found_as_unknown_post)?;
        Ok(Some(comment))
    }

    async fn find_post(&self, id: Uuid) -> Result<PostRecord, PostError> {
        self.posts
            .find_by_id(id)
            .await?
            .ok_or(PostError::UnknownPost)
    }

    async fn ensure_group(&self, group_id: Option<Uuid>) -> Result<(), PostError> {
        let Some(group_id) = group_id else {
            return Ok(());
        };
        match self.groups.find_by_id(group_id).await? {
            Some(_) => Ok(()),
            None => Err(PostError::UnknownGroup),
        }
    }
}

fn not_found_as_unknown_post(err: RepoError) -> PostError {
    match err {
        RepoError::NotFound => PostError::UnknownPost,
        other => PostError::Repo(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::{CreateGroupParams, CreateUserParams, GroupsWriteRepo, UsersRepo};
    use crate::infra::memory::MemoryRepositories;

    struct Fixture {
        service: PostService,
        store: Arc<MemoryRepositories>,
        author: UserRecord,
        other: UserRecord,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryRepositories::new());
        let author = store
            .create_user(CreateUserParams {
                username: "author".to_string(),
                display_name: String::new(),
            })
            .await
            .unwrap();
        let other = store
            .create_user(CreateUserParams {
                username: "other".to_string(),
                display_name: String::new(),
            })
            .await
            .unwrap();
        let service = PostService::new(store.clone(), store.clone(), store.clone(), store.clone());
        Fixture {
            service,
            store,
            author,
            other,
        }
    }

    fn draft(text: &str) -> PostDraft {
        PostDraft {
            text: text.to_string(),
            ..PostDraft::default()
        }
    }

    #[tokio::test]
    async fn create_rejects_blank_text() {
        let fx = fixture().await;
        let err = fx
            .service
            .create_post(&fx.author, draft("   "))
            .await
            .expect_err("blank text");
        assert!(matches!(err, PostError::Validation(_)));
    }

    #[tokio::test]
    async fn create_rejects_unknown_group() {
        let fx = fixture().await;
        let err = fx
            .service
            .create_post(
                &fx.author,
                PostDraft {
                    text: "hello".to_string(),
                    group_id: Some(Uuid::new_v4()),
                    image: None,
                },
            )
            .await
            .expect_err("unknown group");
        assert!(matches!(err, PostError::UnknownGroup));
    }

    #[tokio::test]
    async fn create_assigns_group_and_trims_text() {
        let fx = fixture().await;
        let group = fx
            .store
            .create_group(CreateGroupParams {
                title: "Cats".to_string(),
                slug: "cats".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();

        let post = fx
            .service
            .create_post(
                &fx.author,
                PostDraft {
                    text: "  purr  ".to_string(),
                    group_id: Some(group.id),
                    image: Some(String::new()),
                },
            )
            .await
            .unwrap();

        assert_eq!(post.text, "purr");
        assert_eq!(post.group.map(|g| g.slug).as_deref(), Some("cats"));
        assert_eq!(post.image, None);
    }

    #[tokio::test]
    async fn non_author_edit_is_reported_not_applied() {
        let fx = fixture().await;
        let post = fx
            .service
            .create_post(&fx.author, draft("original"))
            .await
            .unwrap();

        let outcome = fx
            .service
            .edit_post(&fx.other, post.id, draft("hijacked"))
            .await
            .unwrap();
        assert!(matches!(outcome, EditOutcome::NotAuthor));

        let detail = fx.service.post_detail(post.id).await.unwrap();
        assert_eq!(detail.post.text, "original");
    }

    #[tokio::test]
    async fn author_edit_keeps_creation_time() {
        let fx = fixture().await;
        let post = fx
            .service
            .create_post(&fx.author, draft("first"))
            .await
            .unwrap();

        let outcome = fx
            .service
            .edit_post(&fx.author, post.id, draft("second"))
            .await
            .unwrap();
        let EditOutcome::Updated(updated) = outcome else {
            panic!("author edit should apply");
        };
        assert_eq!(updated.text, "second");
        assert_eq!(updated.created_at, post.created_at);
    }

    #[tokio::test]
    async fn only_the_author_may_delete() {
        let fx = fixture().await;
        let post = fx
            .service
            .create_post(&fx.author, draft("bye"))
            .await
            .unwrap();

        assert_eq!(
            fx.service.delete_post(&fx.other, post.id).await.unwrap(),
            DeleteOutcome::NotAuthor
        );
        assert_eq!(
            fx.service.delete_post(&fx.author, post.id).await.unwrap(),
            DeleteOutcome::Deleted
        );
        let err = fx
            .service
            .post_detail(post.id)
            .await
            .expect_err("deleted");
        assert!(matches!(err, PostError::UnknownPost));
    }

    #[tokio::test]
    async fn blank_comment_is_ignored() {
        let fx = fixture().await;
        let post = fx
            .service
            .create_post(&fx.author, draft("talk to me"))
            .await
            .unwrap();

        let none = fx
            .service
            .add_comment(&fx.other, post.id, "  ")
            .await
            .unwrap();
        assert!(none.is_none());

        let some = fx
            .service
            .add_comment(&fx.other, post.id, "hi")
            .await
            .unwrap();
        assert!(some.is_some());

        let detail = fx.service.post_detail(post.id).await.unwrap();
        assert_eq!(detail.comments.len(), 1);
        assert_eq!(detail.comments[0].author.username, "other");
        assert_eq!(detail.author_post_count, 1);
    }

    #[tokio::test]
    async fn comment_on_unknown_post_fails() {
        let fx = fixture().await;
        let err = fx
            .service
            .add_comment(&fx.other, Uuid::new_v4(), "hello")
            .await
            .expect_err("unknown post");
        assert!(matches!(err, PostError::UnknownPost));
    }
}
