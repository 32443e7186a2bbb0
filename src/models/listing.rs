use crate::http::Result;
use crate::models::post::{Post, PostFromQuery};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 50;

// Keeps `(page - 1) * limit` within `i64`.
const MAX_PAGE: i64 = i64::MAX / MAX_LIMIT;

/// Raw query string for `GET /api/posts`.
///
/// Numbers are taken as strings so that garbage like `?page=abc` falls back to the default
/// instead of rejecting the whole request.
#[derive(serde::Deserialize, Default, Debug)]
#[serde(default)]
pub struct ListPostsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub q: Option<String>,
}

/// A resolved, clamped page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFilter {
    pub page: i64,
    pub limit: i64,
    /// Trimmed; `None` when empty.
    pub search: Option<String>,
}

impl PostFilter {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl From<ListPostsQuery> for PostFilter {
    fn from(query: ListPostsQuery) -> Self {
        let page = parse_or(query.page.as_deref(), 1).clamp(1, MAX_PAGE);
        let limit = parse_or(query.limit.as_deref(), DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let search = query
            .q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        PostFilter {
            page,
            limit,
            search,
        }
    }
}

/// Lenient integer parsing for query parameters.
pub fn parse_or(value: Option<&str>, default: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostPage {
    pub posts: Vec<Post>,
    /// Matching published posts across all pages.
    pub total: i64,
}

#[derive(Clone)]
pub struct ListingController {
    pool: PgPool,
}

impl ListingController {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub type DynListingCtrl = Arc<dyn ListingCtrlTrait + Send + Sync>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ListingCtrlTrait {
    /// Published posts only, newest first.
    async fn list_posts(&self, viewer: Option<Uuid>, filter: PostFilter) -> Result<PostPage>;
}

#[async_trait]
impl ListingCtrlTrait for ListingController {
    async fn list_posts(&self, viewer: Option<Uuid>, filter: PostFilter) -> Result<PostPage> {
        let title_pattern = filter
            .search
            .as_deref()
            .map(|q| format!("%{}%", escape_like(q)));

        let posts: Vec<_> = sqlx::query_as::<_, PostFromQuery>(
            // language=PostgreSQL
            r#"
                select
                    post.post_id,
                    post.title,
                    post.slug,
                    post.body,
                    post.tags,
                    post.images,
                    post.published,
                    post.created_at,
                    post.updated_at,
                    (select count(*) from post_like l where l.post_id = post.post_id) likes_count,
                    (select count(*) from post_comment c where c.post_id = post.post_id) comments_count,
                    exists(
                        select 1 from post_like l where l.post_id = post.post_id and l.user_id = $1
                    ) liked,
                    author.user_id author_id,
                    author.first_name author_first_name,
                    author.last_name author_last_name,
                    author.nick_name author_nick_name,
                    author.profile_image author_profile_image
                from post
                inner join "user" author using (user_id)
                where post.published
                  -- the current way to do conditional filtering in SQLx
                  and (
                    $2::text is null
                    or post.title ilike $3
                    or exists(select 1 from unnest(post.tags) tag where lower(tag) = lower($2))
                  )
                order by post.created_at desc
                limit $4
                offset $5
            "#,
        )
        .bind(viewer)
        .bind(&filter.search)
        .bind(&title_pattern)
        .bind(filter.limit)
        .bind(filter.offset())
        .fetch(&self.pool)
        .map_ok(PostFromQuery::into_post)
        .try_collect()
        .await?;

        // Run as a second query; a window function would count only the rows we fetched
        // when the page is past the end.
        let total: i64 = sqlx::query_scalar(
            r#"
                select count(*)
                from post
                where post.published
                  and (
                    $1::text is null
                    or post.title ilike $2
                    or exists(select 1 from unnest(post.tags) tag where lower(tag) = lower($1))
                  )
            "#,
        )
        .bind(&filter.search)
        .bind(&title_pattern)
        .fetch_one(&self.pool)
        .await?;

        Ok(PostPage { posts, total })
    }
}

/// Escape `LIKE` wildcards so user input only ever matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
