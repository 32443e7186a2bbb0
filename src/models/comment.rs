use crate::http::types::Timestamptz;
use crate::http::{Error, Result};
use crate::models::post::AuthorSummary;
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub post: Uuid,
    pub author: AuthorSummary,
    pub body: String,
    pub created_at: Timestamptz,
    pub updated_at: Timestamptz,
}

// Same thing as `PostFromQuery`
#[derive(FromRow)]
pub struct CommentFromQuery {
    pub comment_id: Uuid,
    pub post_id: Uuid,
    pub body: String,
    pub created_at: Timestamptz,
    pub updated_at: Timestamptz,
    pub author_id: Uuid,
    pub author_first_name: Option<String>,
    pub author_last_name: Option<String>,
    pub author_nick_name: Option<String>,
    pub author_profile_image: Option<String>,
}

impl CommentFromQuery {
    pub fn into_comment(self) -> Comment {
        Comment {
            id: self.comment_id,
            post: self.post_id,
            author: AuthorSummary {
                id: self.author_id,
                first_name: self.author_first_name,
                last_name: self.author_last_name,
                nick_name: self.author_nick_name,
                profile_image: self.author_profile_image,
            },
            body: self.body,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct CommentController {
    pool: PgPool,
}

impl CommentController {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub type DynCommentCtrl = Arc<dyn CommentCtrlTrait + Send + Sync>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommentCtrlTrait {
    /// Oldest first. `NotFound` if the post doesn't exist.
    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>>;
    /// `body` must already be trimmed and non-empty.
    async fn create_comment(&self, user_id: Uuid, post_id: Uuid, body: &str) -> Result<Comment>;
    /// Only the comment's author, or an admin, may delete it.
    async fn delete_comment(&self, user_id: Uuid, is_admin: bool, comment_id: Uuid)
        -> Result<()>;
}

#[async_trait]
impl CommentCtrlTrait for CommentController {
    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        // With this, we can return 404 if the post was not found.
        sqlx::query_scalar::<_, Uuid>("select post_id from post where post_id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Post not found"))?;

        let comments = sqlx::query_as::<_, CommentFromQuery>(
            // language=PostgreSQL
            r#"
                select
                    comment.comment_id,
                    comment.post_id,
                    comment.body,
                    comment.created_at,
                    comment.updated_at,
                    author.user_id author_id,
                    author.first_name author_first_name,
                    author.last_name author_last_name,
                    author.nick_name author_nick_name,
                    author.profile_image author_profile_image
                from post_comment comment
                inner join "user" author using (user_id)
                where comment.post_id = $1
                order by comment.created_at
            "#,
        )
        .bind(post_id)
        .fetch(&self.pool)
        .map_ok(CommentFromQuery::into_comment)
        .try_collect()
        .await?;

        Ok(comments)
    }

    async fn create_comment(&self, user_id: Uuid, post_id: Uuid, body: &str) -> Result<Comment> {
        let comment = sqlx::query_as::<_, CommentFromQuery>(
            // language=PostgreSQL
            r#"
                with inserted_comment as (
                    insert into post_comment (post_id, user_id, body)
                    select post_id, $1, $2
                    from post
                    where post_id = $3
                    returning comment_id, post_id, user_id, body, created_at, updated_at
                )
                select
                    comment.comment_id,
                    comment.post_id,
                    comment.body,
                    comment.created_at,
                    comment.updated_at,
                    author.user_id author_id,
                    author.first_name author_first_name,
                    author.last_name author_last_name,
                    author.nick_name author_nick_name,
                    author.profile_image author_profile_image
                from inserted_comment comment
                inner join "user" author on author.user_id = comment.user_id
            "#,
        )
        .bind(user_id)
        .bind(body)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?
        // A comment is inserted unless the post was not found.
        .ok_or_else(|| Error::not_found("Post not found"))?
        .into_comment();

        Ok(comment)
    }

    async fn delete_comment(
        &self,
        user_id: Uuid,
        is_admin: bool,
        comment_id: Uuid,
    ) -> Result<()> {
        let (existed, deleted): (bool, bool) = sqlx::query_as(
            r#"
                with deleted_comment as (
                    delete from post_comment
                    where comment_id = $1 and (user_id = $2 or $3)
                    returning 1
                )
                select
                    exists(select 1 from post_comment where comment_id = $1) existed,
                    exists(select 1 from deleted_comment) deleted
            "#,
        )
        .bind(comment_id)
        .bind(user_id)
        .bind(is_admin)
        .fetch_one(&self.pool)
        .await?;

        if deleted {
            Ok(())
        } else if existed {
            Err(Error::Forbidden)
        } else {
            Err(Error::not_found("Comment not found"))
        }
    }
}
