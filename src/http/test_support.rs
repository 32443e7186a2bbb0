//! Shared scaffolding for handler tests: a context full of mocks and a one-shot request helper.

use crate::config::Config;
use crate::http::extractor::AuthUser;
use crate::http::types::{Day, Timestamptz};
use crate::http::ApiContext;
use crate::models::comment::MockCommentCtrlTrait;
use crate::models::listing::MockListingCtrlTrait;
use crate::models::post::{AuthorSummary, MockPostCtrlTrait, Post};
use crate::models::user::{Gender, MockUserCtrlTrait, Role, User};
use crate::models::MockStoreTrait;
use crate::upstream::exercisedb::MockExerciseSource;
use crate::upstream::inference::MockChatBackend;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use time::macros::date;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

pub const HMAC_KEY: &str = "Yabba Dabba Doo!";

pub fn test_config() -> Config {
    Config {
        hmac_key: HMAC_KEY.to_string(),
        upload_dir: std::env::temp_dir()
            .join(format!("fitness-world-test-{}", Uuid::new_v4()))
            .to_string_lossy()
            .into_owned(),
        ..Default::default()
    }
}

pub fn context(store: MockStoreTrait) -> ApiContext {
    context_with(
        store,
        MockExerciseSource::new(),
        MockChatBackend::new(),
        test_config(),
    )
}

pub fn context_with(
    store: MockStoreTrait,
    exercises: MockExerciseSource,
    chat: MockChatBackend,
    config: Config,
) -> ApiContext {
    ApiContext {
        config: Arc::new(config),
        store: Arc::new(store),
        exercises: Arc::new(exercises),
        chat: Arc::new(chat),
    }
}

pub fn user_store(user_ctrl: MockUserCtrlTrait) -> MockStoreTrait {
    let user_ctrl = Arc::new(user_ctrl);
    let mut store = MockStoreTrait::new();
    store.expect_user().returning(move || user_ctrl.clone());
    store
}

pub fn post_store(post_ctrl: MockPostCtrlTrait) -> MockStoreTrait {
    let post_ctrl = Arc::new(post_ctrl);
    let mut store = MockStoreTrait::new();
    store.expect_post().returning(move || post_ctrl.clone());
    store
}

pub fn listing_store(listing_ctrl: MockListingCtrlTrait) -> MockStoreTrait {
    let listing_ctrl = Arc::new(listing_ctrl);
    let mut store = MockStoreTrait::new();
    store.expect_listing().returning(move || listing_ctrl.clone());
    store
}

pub fn comment_store(comment_ctrl: MockCommentCtrlTrait) -> MockStoreTrait {
    let comment_ctrl = Arc::new(comment_ctrl);
    let mut store = MockStoreTrait::new();
    store.expect_comment().returning(move || comment_ctrl.clone());
    store
}

pub fn token_for(user_id: Uuid, role: Role) -> String {
    AuthUser {
        user_id,
        email: "fred@bedrock.example".into(),
        role,
    }
    .to_jwt(HMAC_KEY)
}

pub fn sample_user(user_id: Uuid) -> User {
    User {
        id: user_id,
        email: "fred@bedrock.example".into(),
        password_hash: String::new(),
        birthday: Day(date!(1985 - 02 - 11)),
        gender: Gender::Male,
        country_code: Some("US".into()),
        first_name: Some("Fred".into()),
        last_name: Some("Flintstone".into()),
        nick_name: None,
        profile_image: None,
        role: Role::User,
        created_at: Timestamptz(OffsetDateTime::UNIX_EPOCH),
        updated_at: Timestamptz(OffsetDateTime::UNIX_EPOCH),
    }
}

pub fn sample_post(post_id: Uuid, author_id: Uuid) -> Post {
    Post {
        id: post_id,
        author: AuthorSummary {
            id: author_id,
            first_name: Some("Fred".into()),
            last_name: Some("Flintstone".into()),
            nick_name: None,
            profile_image: None,
        },
        title: "Leg day".into(),
        slug: "leg-day-1700000000000".into(),
        body: "Never skip it.".into(),
        tags: vec!["legs".into()],
        images: vec![],
        likes_count: 0,
        comments_count: 0,
        published: true,
        liked: false,
        created_at: Timestamptz(OffsetDateTime::UNIX_EPOCH),
        updated_at: Timestamptz(OffsetDateTime::UNIX_EPOCH),
    }
}

/// Run one request through `app`. The body is parsed as JSON, or `Value::Null` when empty.
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    read_response(app, request).await
}

/// POST a JSON content type with a body that may not be valid JSON at all.
pub async fn send_raw(app: Router, uri: &str, body: &'static str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();

    read_response(app, request).await
}

async fn read_response(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    (status, json)
}
