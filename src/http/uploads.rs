use crate::http::extractor::AuthUser;
use crate::http::{ApiContext, Error, Result};
use crate::models::user::User;
use anyhow::Context;
use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderMap};
use axum::routing::post;
use axum::{Json, Router};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use uuid::Uuid;

const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

// Room for the multipart framing around a maximum-size file.
const MAX_REQUEST_BYTES: usize = MAX_AVATAR_BYTES + 1024 * 1024;

const AVATAR_FIELD: &str = "avatar";
const AVATAR_DIR: &str = "avatars";

pub(crate) fn router() -> Router<ApiContext> {
    Router::new().route(
        "/api/uploads/avatar",
        post(upload_avatar).layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES)),
    )
}

#[derive(serde::Serialize)]
struct AvatarBody {
    url: String,
    user: User,
}

async fn upload_avatar(
    auth_user: AuthUser,
    ctx: State<ApiContext>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<AvatarBody>> {
    let mut saved = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some(AVATAR_FIELD) {
            continue;
        }

        let is_image = field
            .content_type()
            .map_or(false, |mime| mime.starts_with("image/"));
        if !is_image {
            return Err(Error::bad_request("Only images allowed"));
        }

        let file_name = avatar_file_name(auth_user.user_id, field.file_name());
        let bytes = read_limited(field).await?;
        saved = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = saved.ok_or_else(|| Error::bad_request("No file uploaded"))?;

    let dir = PathBuf::from(&ctx.config.upload_dir).join(AVATAR_DIR);
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;
    tokio::fs::write(dir.join(&file_name), &bytes)
        .await
        .with_context(|| format!("failed to write avatar {}", file_name))?;

    let base_url = match ctx.config.public_base_url() {
        Some(url) => url.to_string(),
        None => request_base_url(&headers),
    };
    let url = format!("{}/uploads/{}/{}", base_url, AVATAR_DIR, file_name);

    let user = ctx
        .store
        .user()
        .set_profile_image(auth_user.user_id, &url)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;

    log::info!("user {} uploaded avatar {}", auth_user.user_id, file_name);
    Ok(Json(AvatarBody { url, user }))
}

/// Buffer the field, giving up as soon as it grows past the size limit.
async fn read_limited(mut field: Field<'_>) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();

    while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
        if bytes.len() + chunk.len() > MAX_AVATAR_BYTES {
            return Err(Error::PayloadTooLarge("File too large (max 5 MB)".into()));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> Error {
    log::debug!("failed to read multipart body: {}", e);
    Error::bad_request("Malformed multipart body")
}

/// `avatar_<user id>_<unix millis><ext>`, keeping the upload's lower-cased extension
/// (`.jpg` when it has none).
fn avatar_file_name(user_id: Uuid, original: Option<&str>) -> String {
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_else(|| ".jpg".to_string());

    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;

    format!("avatar_{}_{}{}", user_id, millis, ext)
}

/// Rebuild the URL the client reached us on, trusting the proxy's `X-Forwarded-Proto`.
fn request_base_url(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|proto| !proto.is_empty())
        .unwrap_or("https");

    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");

    format!("{}://{}", proto, host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::{
        context, context_with, sample_user, test_config, token_for, user_store,
    };
    use crate::models::user::{MockUserCtrlTrait, Role};
    use crate::models::MockStoreTrait;
    use crate::upstream::exercisedb::MockExerciseSource;
    use crate::upstream::inference::MockChatBackend;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "fitness-world-boundary";

    fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
            b = BOUNDARY,
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn upload(app: Router, token: Option<&str>, body: Vec<u8>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/uploads/avatar")
            .header(header::HOST, "fitness.example")
            .header("x-forwarded-proto", "http, https")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = app
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[test]
    fn file_names_keep_a_lowercased_extension() {
        let user_id = Uuid::new_v4();

        let name = avatar_file_name(user_id, Some("Me.PNG"));
        assert!(name.starts_with(&format!("avatar_{}_", user_id)));
        assert!(name.ends_with(".png"));

        assert!(avatar_file_name(user_id, Some("no-extension")).ends_with(".jpg"));
        assert!(avatar_file_name(user_id, None).ends_with(".jpg"));
    }

    #[test]
    fn base_url_from_request_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("api.example:5005"));
        assert_eq!(request_base_url(&headers), "https://api.example:5005");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("http,https"));
        assert_eq!(request_base_url(&headers), "http://api.example:5005");
    }

    #[tokio::test]
    async fn avatar_is_saved_and_linked() {
        let user_id = Uuid::new_v4();
        let config = test_config();
        let upload_dir = PathBuf::from(&config.upload_dir);

        let mut user_ctrl = MockUserCtrlTrait::new();
        user_ctrl
            .expect_set_profile_image()
            .withf(move |id, url| {
                *id == user_id
                    && url.starts_with(&format!(
                        "http://fitness.example/uploads/avatars/avatar_{}_",
                        user_id
                    ))
                    && url.ends_with(".png")
            })
            .return_once(|id, url| {
                let mut user = sample_user(id);
                user.profile_image = Some(url.to_string());
                Ok(Some(user))
            });

        let ctx = context_with(
            user_store(user_ctrl),
            MockExerciseSource::new(),
            MockChatBackend::new(),
            config,
        );

        let (status, json) = upload(
            router().with_state(ctx),
            Some(&token_for(user_id, Role::User)),
            multipart_body("avatar", "me.png", "image/png", b"\x89PNG fake"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let url = json["url"].as_str().unwrap();
        assert_eq!(json["user"]["profileImage"], url);

        let file_name = url.rsplit('/').next().unwrap();
        let stored = std::fs::read(upload_dir.join(AVATAR_DIR).join(file_name)).unwrap();
        assert_eq!(stored, b"\x89PNG fake");

        std::fs::remove_dir_all(upload_dir).ok();
    }

    #[tokio::test]
    async fn configured_base_url_wins() {
        let user_id = Uuid::new_v4();
        let mut config = test_config();
        config.backend_base_url = Some("https://api.fitness.example".into());
        let upload_dir = config.upload_dir.clone();

        let mut user_ctrl = MockUserCtrlTrait::new();
        user_ctrl
            .expect_set_profile_image()
            .withf(|_, url| url.starts_with("https://api.fitness.example/uploads/avatars/"))
            .return_once(|id, _| Ok(Some(sample_user(id))));

        let ctx = context_with(
            user_store(user_ctrl),
            MockExerciseSource::new(),
            MockChatBackend::new(),
            config,
        );

        let (status, _) = upload(
            router().with_state(ctx),
            Some(&token_for(user_id, Role::User)),
            multipart_body("avatar", "me.jpeg", "image/jpeg", b"jpeg"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        std::fs::remove_dir_all(upload_dir).ok();
    }

    #[tokio::test]
    async fn non_images_are_rejected() {
        let (status, json) = upload(
            router().with_state(context(MockStoreTrait::new())),
            Some(&token_for(Uuid::new_v4(), Role::User)),
            multipart_body("avatar", "notes.txt", "text/plain", b"hello"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Only images allowed");
    }

    #[tokio::test]
    async fn missing_field_is_400() {
        let (status, json) = upload(
            router().with_state(context(MockStoreTrait::new())),
            Some(&token_for(Uuid::new_v4(), Role::User)),
            multipart_body("picture", "me.png", "image/png", b"png"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn oversized_files_are_413() {
        let data = vec![0u8; MAX_AVATAR_BYTES + 1];

        let (status, _) = upload(
            router().with_state(context(MockStoreTrait::new())),
            Some(&token_for(Uuid::new_v4(), Role::User)),
            multipart_body("avatar", "huge.png", "image/png", &data),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn upload_requires_login() {
        let (status, _) = upload(
            router().with_state(context(MockStoreTrait::new())),
            None,
            multipart_body("avatar", "me.png", "image/png", b"png"),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
