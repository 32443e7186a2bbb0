use crate::http::extractor::{AuthUser, JsonBody};
use crate::http::{ApiContext, Error, Result};
use crate::models::user::{LoginUser, RegisterUser, User};
use anyhow::Context;
use argon2::{Argon2, PasswordHash};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub(crate) fn router() -> Router<ApiContext> {
    Router::new()
        .route("/api/users", post(create_user).get(list_users))
        .route("/api/auth/login", post(login_user))
        .route("/api/protected/me", get(get_current_user))
}

#[derive(serde::Serialize)]
struct UserBody {
    user: User,
}

#[derive(serde::Serialize)]
struct LoginBody {
    token: String,
    user: User,
}

async fn create_user(
    ctx: State<ApiContext>,
    JsonBody(req): JsonBody<RegisterUser>,
) -> Result<(StatusCode, Json<User>)> {
    let new_user = req.validate()?;

    let user = ctx.store.user().create_user(new_user).await?;

    log::info!("registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_users(ctx: State<ApiContext>) -> Result<Json<Vec<User>>> {
    let users = ctx.store.user().list_users().await?;
    Ok(Json(users))
}

async fn login_user(
    ctx: State<ApiContext>,
    JsonBody(req): JsonBody<LoginUser>,
) -> Result<Json<LoginBody>> {
    let user = ctx
        .store
        .user()
        .user_by_email(&req.email)
        .await?
        // Don't reveal whether the email or the password was wrong.
        .ok_or(Error::Unauthorized(INVALID_CREDENTIALS))?;

    verify_password(req.password, user.password_hash.clone()).await?;

    let token = AuthUser {
        user_id: user.id,
        email: user.email.clone(),
        role: user.role,
    }
    .to_jwt(&ctx.config.hmac_key);

    Ok(Json(LoginBody { token, user }))
}

async fn get_current_user(auth_user: AuthUser, ctx: State<ApiContext>) -> Result<Json<UserBody>> {
    let user = ctx
        .store
        .user()
        .user_by_id(auth_user.user_id)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;

    Ok(Json(UserBody { user }))
}

async fn verify_password(password: String, password_hash: String) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let hash = PasswordHash::new(&password_hash)
            .map_err(|e| anyhow::anyhow!("invalid password hash: {}", e))?;

        hash.verify_password(&[&Argon2::default()], password)
            .map_err(|e| match e {
                argon2::password_hash::Error::Password => {
                    Error::Unauthorized(INVALID_CREDENTIALS)
                }
                _ => anyhow::anyhow!("failed to verify password hash: {}", e).into(),
            })
    })
    .await
    .context("panic in verifying password hash")?
}
