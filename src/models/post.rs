use crate::http::types::Timestamptz;
use crate::http::{Error, Result, ResultExt};
use async_trait::async_trait;
use itertools::Itertools;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

/// The subset of a user shown next to their posts and comments.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub profile_image: Option<String>,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author: AuthorSummary,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub published: bool,
    /// Whether the requesting user has liked this post. Always `false` for anonymous requests.
    pub liked: bool,
    pub created_at: Timestamptz,
    pub updated_at: Timestamptz,
}

#[derive(serde::Deserialize, Debug)]
pub struct CreatePost {
    // Optional at the type level so a missing field is reported as a 400 with a useful
    // message rather than a generic deserialization failure.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "published_by_default")]
    pub published: bool,
}

fn published_by_default() -> bool {
    true
}

/// A `CreatePost` with its title trimmed and both title and body known to be present.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub published: bool,
}

impl CreatePost {
    pub fn validate(self) -> Result<NewPost> {
        let title = self.title.map(|t| t.trim().to_string()).unwrap_or_default();
        let body = self.body.unwrap_or_default();

        if title.is_empty() || body.trim().is_empty() {
            return Err(Error::bad_request("Title and body are required"));
        }

        Ok(NewPost {
            title,
            body,
            tags: self.tags,
            images: self.images,
            published: self.published,
        })
    }
}

#[derive(serde::Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
    pub published: Option<bool>,
}

#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub liked: bool,
    pub likes_count: i64,
}

// The nested `author` object is selected as flattened
// columns and reassembled afterwards.
#[derive(FromRow)]
pub struct PostFromQuery {
    pub post_id: Uuid,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub published: bool,
    pub created_at: Timestamptz,
    pub updated_at: Timestamptz,
    pub likes_count: i64,
    pub comments_count: i64,
    pub liked: bool,
    pub author_id: Uuid,
    pub author_first_name: Option<String>,
    pub author_last_name: Option<String>,
    pub author_nick_name: Option<String>,
    pub author_profile_image: Option<String>,
}

impl PostFromQuery {
    pub fn into_post(self) -> Post {
        Post {
            id: self.post_id,
            author: AuthorSummary {
                id: self.author_id,
                first_name: self.author_first_name,
                last_name: self.author_last_name,
                nick_name: self.author_nick_name,
                profile_image: self.author_profile_image,
            },
            title: self.title,
            slug: self.slug,
            body: self.body,
            tags: self.tags,
            images: self.images,
            likes_count: self.likes_count,
            comments_count: self.comments_count,
            published: self.published,
            liked: self.liked,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// How a single post is addressed: by id for writes, by slug for public links.
#[derive(Debug, Clone, Copy)]
enum PostKey<'a> {
    Id(Uuid),
    Slug(&'a str),
}

#[derive(Clone)]
pub struct PostController {
    pool: PgPool,
}

impl PostController {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub type DynPostCtrl = Arc<dyn PostCtrlTrait + Send + Sync>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PostCtrlTrait {
    async fn create_post(&self, author_id: Uuid, post: NewPost) -> Result<Post>;
    async fn post_by_slug(&self, viewer: Option<Uuid>, slug: &str) -> Result<Post>;
    /// Only the author, or an admin, may update a post.
    async fn update_post(
        &self,
        user_id: Uuid,
        is_admin: bool,
        post_id: Uuid,
        update: UpdatePost,
    ) -> Result<Post>;
    /// Comments and likes are removed along with the post.
    async fn delete_post(&self, user_id: Uuid, is_admin: bool, post_id: Uuid) -> Result<()>;
    /// Like the post if the user hasn't yet, otherwise remove their like.
    async fn toggle_like(&self, user_id: Uuid, post_id: Uuid) -> Result<LikeState>;
}

impl PostController {
    async fn select_post(&self, viewer: Option<Uuid>, key: PostKey<'_>) -> Result<Post> {
        let (post_id, slug) = match key {
            PostKey::Id(id) => (Some(id), None),
            PostKey::Slug(slug) => (None, Some(slug)),
        };

        let post = sqlx::query_as::<_, PostFromQuery>(
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
                -- exactly one of these is set
                where ($2::uuid is null or post.post_id = $2)
                  and ($3::text is null or post.slug = $3)
            "#,
        )
        .bind(viewer)
        .bind(post_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Post not found"))?;

        Ok(post.into_post())
    }
}

#[async_trait]
impl PostCtrlTrait for PostController {
    async fn create_post(&self, author_id: Uuid, post: NewPost) -> Result<Post> {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let slug = slug_with_suffix(&post.title, &millis.to_string());

        let post_id: Uuid = sqlx::query_scalar(
            r#"
                insert into post (user_id, title, slug, body, tags, images, published)
                values ($1, $2, $3, $4, $5, $6, $7)
                returning post_id
            "#,
        )
        .bind(author_id)
        .bind(&post.title)
        .bind(&slug)
        .bind(&post.body)
        .bind(&post.tags)
        .bind(&post.images)
        .bind(post.published)
        .fetch_one(&self.pool)
        .await
        .on_constraint("post_slug_key", |_| {
            Error::Conflict(format!("duplicate post slug: {}", slug).into())
        })?;

        self.select_post(Some(author_id), PostKey::Id(post_id)).await
    }

    async fn post_by_slug(&self, viewer: Option<Uuid>, slug: &str) -> Result<Post> {
        self.select_post(viewer, PostKey::Slug(slug)).await
    }

    async fn update_post(
        &self,
        user_id: Uuid,
        is_admin: bool,
        post_id: Uuid,
        update: UpdatePost,
    ) -> Result<Post> {
        let title = update.title.map(|t| t.trim().to_string());
        if title.as_deref() == Some("") {
            return Err(Error::bad_request("Title cannot be empty"));
        }
        if update.body.as_deref().map(str::trim) == Some("") {
            return Err(Error::bad_request("Body cannot be empty"));
        }

        let mut tx = self.pool.begin().await?;

        let author_id: Uuid =
            sqlx::query_scalar("select user_id from post where post_id = $1 for update")
                .bind(post_id)
                .fetch_optional(&mut tx)
                .await?
                .ok_or_else(|| Error::not_found("Post not found"))?;

        if author_id != user_id && !is_admin {
            return Err(Error::Forbidden);
        }

        // A retitled post keeps a stable suffix derived from its id.
        let new_slug = title
            .as_deref()
            .map(|title| slug_with_suffix(title, &id_suffix(post_id)));

        sqlx::query(
            r#"
                update post
                set
                    title = coalesce($1, title),
                    slug = coalesce($2, slug),
                    body = coalesce($3, body),
                    tags = coalesce($4, tags),
                    images = coalesce($5, images),
                    published = coalesce($6, published)
                where post_id = $7
            "#,
        )
        .bind(&title)
        .bind(&new_slug)
        .bind(&update.body)
        .bind(&update.tags)
        .bind(&update.images)
        .bind(update.published)
        .bind(post_id)
        .execute(&mut tx)
        .await
        .on_constraint("post_slug_key", |_| {
            Error::Conflict(
                format!(
                    "duplicate post slug: {}",
                    new_slug.as_deref().unwrap_or_default()
                )
                .into(),
            )
        })?;

        tx.commit().await?;

        self.select_post(Some(user_id), PostKey::Id(post_id)).await
    }

    async fn delete_post(&self, user_id: Uuid, is_admin: bool, post_id: Uuid) -> Result<()> {
        let (existed, deleted): (bool, bool) = sqlx::query_as(
            // language=PostgreSQL
            r#"
                -- The main query always sees the "before" picture of the database,
                -- so the permission check folds together with the delete itself.
                -- `on delete cascade` takes care of comments and likes.
                with deleted_post as (
                    delete from post
                    where post_id = $1 and (user_id = $2 or $3)
                    returning 1
                )
                select
                    exists(select 1 from post where post_id = $1) existed,
                    exists(select 1 from deleted_post) deleted
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .bind(is_admin)
        .fetch_one(&self.pool)
        .await?;

        if deleted {
            Ok(())
        } else if existed {
            Err(Error::Forbidden)
        } else {
            Err(Error::not_found("Post not found"))
        }
    }

    async fn toggle_like(&self, user_id: Uuid, post_id: Uuid) -> Result<LikeState> {
        let mut tx = self.pool.begin().await?;

        // Lock the post row so concurrent toggles by the same user serialize.
        sqlx::query_scalar::<_, Uuid>("select post_id from post where post_id = $1 for update")
            .bind(post_id)
            .fetch_optional(&mut tx)
            .await?
            .ok_or_else(|| Error::not_found("Post not found"))?;

        let inserted: Option<i32> = sqlx::query_scalar(
            r#"
                insert into post_like (post_id, user_id)
                values ($1, $2)
                on conflict do nothing
                returning 1
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(&mut tx)
        .await?;

        let liked = inserted.is_some();
        if !liked {
            sqlx::query("delete from post_like where post_id = $1 and user_id = $2")
                .bind(post_id)
                .bind(user_id)
                .execute(&mut tx)
                .await?;
        }

        let likes_count: i64 = sqlx::query_scalar("select count(*) from post_like where post_id = $1")
            .bind(post_id)
            .fetch_one(&mut tx)
            .await?;

        tx.commit().await?;

        Ok(LikeState { liked, likes_count })
    }
}

/// The last six hex digits of the post id.
fn id_suffix(post_id: Uuid) -> String {
    let simple = post_id.simple().to_string();
    simple[simple.len() - 6..].to_string()
}

fn slug_with_suffix(title: &str, suffix: &str) -> String {
    let base = slugify(title);
    let base = if base.is_empty() { "post".to_string() } else { base };
    format!("{}-{}", base, suffix)
}

fn slugify(string: &str) -> String {
    const QUOTE_CHARS: &[char] = &['\'', '"'];

    string
        // Split on anything that isn't a word character or quotation mark.
        // This has the effect of keeping contractions and possessives together.
        .split(|c: char| !(QUOTE_CHARS.contains(&c) || c.is_alphanumeric()))
        // If multiple non-word characters follow each other then we'll get empty substrings
        // so we'll filter those out.
        .filter(|s| !s.is_empty())
        .map(|s| {
            // Remove quotes, then transliterate to ASCII ("Straße" -> "strasse").
            deunicode::deunicode(&s.replace(QUOTE_CHARS, ""))
                .chars()
                .filter(char::is_ascii_alphanumeric)
                .map(|c| c.to_ascii_lowercase())
                .collect::<String>()
        })
        .filter(|s| !s.is_empty())
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(
            slugify("Leg Day: Squats, Lunges and You"),
            "leg-day-squats-lunges-and-you"
        );

        assert_eq!(
            slugify("Why does everyone skip Cardio?"),
            "why-does-everyone-skip-cardio"
        );

        assert_eq!(
            slugify("Don't Quit: It's as Easy as 1, 2, 3!"),
            "dont-quit-its-as-easy-as-1-2-3"
        );

        assert_eq!(slugify("Über Straße WORKOUT"), "uber-strasse-workout");
        assert_eq!(slugify("Crème brûlée cheat day"), "creme-brulee-cheat-day");
    }

    #[test]
    fn slug_falls_back_to_post() {
        assert_eq!(slug_with_suffix("!!!", "1700000000000"), "post-1700000000000");
        assert_eq!(slug_with_suffix("'\"", "abc123"), "post-abc123");
        assert_eq!(slug_with_suffix("Morning Run", "42"), "morning-run-42");
    }

    #[test]
    fn id_suffix_is_last_six_hex_digits() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(id_suffix(id), "5fe0c8");
    }

    #[test]
    fn title_and_body_are_required() {
        fn create(title: Option<&str>, body: Option<&str>) -> CreatePost {
            CreatePost {
                title: title.map(Into::into),
                body: body.map(Into::into),
                tags: vec!["rest".into()],
                images: vec![],
                published: true,
            }
        }

        let post = create(Some("  Rest days  "), Some("matter")).validate().unwrap();
        assert_eq!(post.title, "Rest days");
        assert_eq!(post.body, "matter");
        assert_eq!(post.tags, ["rest"]);

        for (title, body) in [
            (None, Some("body")),
            (Some("title"), None),
            (Some("   "), Some("body")),
            (Some("title"), Some("\n")),
        ] {
            match create(title, body).validate() {
                Err(Error::BadRequest(message)) => {
                    assert_eq!(message, "Title and body are required")
                }
                other => panic!("expected a bad request, got {:?}", other),
            }
        }
    }
}
