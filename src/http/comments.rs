use crate::http::extractor::{AuthUser, JsonBody};
use crate::http::{ApiContext, Error, Result};
use crate::models::comment::Comment;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

pub(crate) fn router() -> Router<ApiContext> {
    // `:id` is the post for `GET`/`POST` and the comment for `DELETE`.
    Router::new().route(
        "/api/comments/:id",
        get(list_comments).post(add_comment).delete(delete_comment),
    )
}

#[derive(serde::Deserialize)]
struct AddComment {
    #[serde(default)]
    body: Option<String>,
}

async fn list_comments(
    ctx: State<ApiContext>,
    Path(post_id): Path<String>,
) -> Result<Json<Vec<Comment>>> {
    let post_id = parse_id(&post_id, "Post not found")?;

    let comments = ctx.store.comment().comments_for_post(post_id).await?;

    Ok(Json(comments))
}

async fn add_comment(
    auth_user: AuthUser,
    ctx: State<ApiContext>,
    Path(post_id): Path<String>,
    JsonBody(req): JsonBody<AddComment>,
) -> Result<(StatusCode, Json<Comment>)> {
    let body = req
        .body
        .as_deref()
        .map(str::trim)
        .filter(|body| !body.is_empty())
        .ok_or_else(|| Error::bad_request("Comment body is required"))?;

    let post_id = parse_id(&post_id, "Post not found")?;

    let comment = ctx
        .store
        .comment()
        .create_comment(auth_user.user_id, post_id, body)
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

async fn delete_comment(
    auth_user: AuthUser,
    ctx: State<ApiContext>,
    Path(comment_id): Path<String>,
) -> Result<StatusCode> {
    let comment_id = parse_id(&comment_id, "Comment not found")?;

    ctx.store
        .comment()
        .delete_comment(auth_user.user_id, auth_user.is_admin(), comment_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

fn parse_id(raw: &str, not_found: &'static str) -> Result<Uuid> {
    raw.parse().map_err(|_| Error::not_found(not_found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::{comment_store, context, send, token_for};
    use crate::models::comment::MockCommentCtrlTrait;
    use crate::models::post::AuthorSummary;
    use crate::models::user::Role;
    use crate::models::MockStoreTrait;
    use crate::http::types::Timestamptz;
    use axum::http::Method;
    use mockall::predicate::*;
    use serde_json::json;
    use time::OffsetDateTime;

    fn app(store: MockStoreTrait) -> Router {
        router().with_state(context(store))
    }

    fn comment(post_id: Uuid, author_id: Uuid, body: &str) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            post: post_id,
            author: AuthorSummary {
                id: author_id,
                first_name: Some("Barney".into()),
                last_name: Some("Rubble".into()),
                nick_name: None,
                profile_image: None,
            },
            body: body.into(),
            created_at: Timestamptz(OffsetDateTime::UNIX_EPOCH),
            updated_at: Timestamptz(OffsetDateTime::UNIX_EPOCH),
        }
    }

    #[tokio::test]
    async fn list_is_public() {
        let post_id = Uuid::new_v4();
        let mut comments = MockCommentCtrlTrait::new();
        comments
            .expect_comments_for_post()
            .with(eq(post_id))
            .return_once(|post_id| {
                Ok(vec![
                    comment(post_id, Uuid::new_v4(), "first"),
                    comment(post_id, Uuid::new_v4(), "second"),
                ])
            });

        let (status, json) = send(
            app(comment_store(comments)),
            Method::GET,
            &format!("/api/comments/{}", post_id),
            None,
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["body"], "first");
        assert_eq!(json[1]["post"], post_id.to_string());
        assert_eq!(json[1]["author"]["firstName"], "Barney");
    }

    #[tokio::test]
    async fn body_is_trimmed_before_storing() {
        let user = Uuid::new_v4();
        let post_id = Uuid::new_v4();

        let mut comments = MockCommentCtrlTrait::new();
        comments
            .expect_create_comment()
            .with(eq(user), eq(post_id), eq("Nice form!"))
            .return_once(|user, post_id, body| Ok(comment(post_id, user, body)));

        let (status, json) = send(
            app(comment_store(comments)),
            Method::POST,
            &format!("/api/comments/{}", post_id),
            Some(&token_for(user, Role::User)),
            Some(json!({ "body": "  Nice form!\n" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["body"], "Nice form!");
    }

    #[tokio::test]
    async fn blank_body_is_400() {
        for body in [json!({ "body": "   " }), json!({})] {
            let (status, json) = send(
                app(MockStoreTrait::new()),
                Method::POST,
                &format!("/api/comments/{}", Uuid::new_v4()),
                Some(&token_for(Uuid::new_v4(), Role::User)),
                Some(body),
            )
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["error"], "Comment body is required");
        }
    }

    #[tokio::test]
    async fn commenting_on_a_missing_post_is_404() {
        let mut comments = MockCommentCtrlTrait::new();
        comments
            .expect_create_comment()
            .return_once(|_, _, _| Err(Error::not_found("Post not found")));

        let (status, json) = send(
            app(comment_store(comments)),
            Method::POST,
            &format!("/api/comments/{}", Uuid::new_v4()),
            Some(&token_for(Uuid::new_v4(), Role::User)),
            Some(json!({ "body": "hello?" })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Post not found");
    }

    #[tokio::test]
    async fn delete_passes_admin_flag() {
        let admin = Uuid::new_v4();
        let comment_id = Uuid::new_v4();

        let mut comments = MockCommentCtrlTrait::new();
        comments
            .expect_delete_comment()
            .with(eq(admin), eq(true), eq(comment_id))
            .return_once(|_, _, _| Ok(()));

        let (status, _) = send(
            app(comment_store(comments)),
            Method::DELETE,
            &format!("/api/comments/{}", comment_id),
            Some(&token_for(admin, Role::Admin)),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn delete_by_someone_else_is_403() {
        let mut comments = MockCommentCtrlTrait::new();
        comments
            .expect_delete_comment()
            .return_once(|_, _, _| Err(Error::Forbidden));

        let (status, _) = send(
            app(comment_store(comments)),
            Method::DELETE,
            &format!("/api/comments/{}", Uuid::new_v4()),
            Some(&token_for(Uuid::new_v4(), Role::User)),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn delete_requires_login() {
        let (status, _) = send(
            app(MockStoreTrait::new()),
            Method::DELETE,
            &format!("/api/comments/{}", Uuid::new_v4()),
            None,
            None,
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
