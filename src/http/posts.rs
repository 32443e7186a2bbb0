use crate::http::extractor::{AuthUser, JsonBody, MaybeAuthUser};
use crate::http::{ApiContext, Error, Result};
use crate::models::listing::{ListPostsQuery, PostFilter};
use crate::models::post::{CreatePost, LikeState, Post, UpdatePost};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

pub(crate) fn router() -> Router<ApiContext> {
    // `:post` is a slug for `GET` and an id everywhere else; matchit wants one name per segment.
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route(
            "/api/posts/:post",
            get(get_post_by_slug).patch(update_post).delete(delete_post),
        )
        .route("/api/posts/:post/like", post(toggle_like))
}

#[derive(serde::Serialize)]
struct PostsPage {
    page: i64,
    limit: i64,
    total: i64,
    posts: Vec<Post>,
}

async fn list_posts(
    maybe_auth_user: MaybeAuthUser,
    ctx: State<ApiContext>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<PostsPage>> {
    let filter = PostFilter::from(query);
    let (page, limit) = (filter.page, filter.limit);

    let result = ctx
        .store
        .listing()
        .list_posts(maybe_auth_user.user_id(), filter)
        .await?;

    Ok(Json(PostsPage {
        page,
        limit,
        total: result.total,
        posts: result.posts,
    }))
}

async fn create_post(
    auth_user: AuthUser,
    ctx: State<ApiContext>,
    JsonBody(req): JsonBody<CreatePost>,
) -> Result<(StatusCode, Json<Post>)> {
    let new_post = req.validate()?;

    let post = ctx
        .store
        .post()
        .create_post(auth_user.user_id, new_post)
        .await?;

    log::info!("user {} created post {}", auth_user.user_id, post.id);
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post_by_slug(
    maybe_auth_user: MaybeAuthUser,
    ctx: State<ApiContext>,
    Path(slug): Path<String>,
) -> Result<Json<Post>> {
    let post = ctx
        .store
        .post()
        .post_by_slug(maybe_auth_user.user_id(), &slug)
        .await?;

    Ok(Json(post))
}

async fn update_post(
    auth_user: AuthUser,
    ctx: State<ApiContext>,
    Path(post_id): Path<String>,
    JsonBody(req): JsonBody<UpdatePost>,
) -> Result<Json<Post>> {
    let post_id = parse_post_id(&post_id)?;

    let post = ctx
        .store
        .post()
        .update_post(auth_user.user_id, auth_user.is_admin(), post_id, req)
        .await?;

    Ok(Json(post))
}

async fn delete_post(
    auth_user: AuthUser,
    ctx: State<ApiContext>,
    Path(post_id): Path<String>,
) -> Result<StatusCode> {
    let post_id = parse_post_id(&post_id)?;

    ctx.store
        .post()
        .delete_post(auth_user.user_id, auth_user.is_admin(), post_id)
        .await?;

    log::info!("user {} deleted post {}", auth_user.user_id, post_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_like(
    auth_user: AuthUser,
    ctx: State<ApiContext>,
    Path(post_id): Path<String>,
) -> Result<Json<LikeState>> {
    let post_id = parse_post_id(&post_id)?;

    let state = ctx
        .store
        .post()
        .toggle_like(auth_user.user_id, post_id)
        .await?;

    Ok(Json(state))
}

/// An id that can't be a post id can't name an existing post either.
fn parse_post_id(raw: &str) -> Result<Uuid> {
    raw.parse().map_err(|_| Error::not_found("Post not found"))
}
