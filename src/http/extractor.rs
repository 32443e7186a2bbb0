use crate::http::error::Error;
use crate::http::ApiContext;
use async_trait::async_trait;
use axum::extract::{FromRef, FromRequest, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderValue, Request};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use sha2::Sha384;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::user::Role;

const DEFAULT_SESSION_LENGTH: time::Duration = time::Duration::weeks(1);

// RFC 6750 bearer tokens. The frontend stores the token from `/api/auth/login` verbatim.
const SCHEME_PREFIX: &str = "Bearer ";

const MISSING_HEADER: &str = "Missing or invalid Authorization header";
const INVALID_TOKEN: &str = "Invalid or expired token";

/// Add this as a parameter to a handler function to require the user to be logged in.
///
/// Parses a JWT from the `Authorization: Bearer <token>` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Add this as a parameter to a handler function to optionally check if the user is logged in.
///
/// If the `Authorization` header is absent then this will be `Self(None)`, otherwise it will
/// validate the token.
///
/// This is in contrast to directly using `Option<AuthUser>`, which will be `None` if there
/// is *any* error in deserializing, which isn't exactly what we want.
pub struct MaybeAuthUser(pub Option<AuthUser>);

#[derive(serde::Serialize, serde::Deserialize)]
struct AuthUserClaims {
    sub: Uuid,
    email: String,
    #[serde(default)]
    role: Role,
    /// Standard JWT `exp` claim.
    exp: i64,
}

impl AuthUser {
    pub(in crate::http) fn to_jwt(&self, hmac_key: &str) -> String {
        let hmac = Hmac::<Sha384>::new_from_slice(hmac_key.as_bytes())
            .expect("HMAC-SHA-384 can accept any key length");

        AuthUserClaims {
            sub: self.user_id,
            email: self.email.clone(),
            role: self.role,
            exp: (OffsetDateTime::now_utc() + DEFAULT_SESSION_LENGTH).unix_timestamp(),
        }
        .sign_with_key(&hmac)
        .expect("HMAC signing should be infallible")
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Attempt to parse `Self` from an `Authorization` header.
    fn from_authorization(hmac_key: &str, auth_header: &HeaderValue) -> Result<Self, Error> {
        let auth_header = auth_header.to_str().map_err(|_| {
            log::debug!("Authorization header is not UTF-8");
            Error::Unauthorized(MISSING_HEADER)
        })?;

        let token = auth_header
            .strip_prefix(SCHEME_PREFIX)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                log::debug!(
                    "Authorization header is using the wrong scheme: {:?}",
                    auth_header
                );
                Error::Unauthorized(MISSING_HEADER)
            })?;

        let jwt =
            jwt::Token::<jwt::Header, AuthUserClaims, _>::parse_unverified(token).map_err(|e| {
                log::debug!(
                    "failed to parse Authorization header {:?}: {}",
                    auth_header,
                    e
                );
                Error::Unauthorized(INVALID_TOKEN)
            })?;

        // SHA-384 (HS-384) is harder to brute-force than SHA-256 at the cost of a slightly
        // larger token.
        let hmac = Hmac::<Sha384>::new_from_slice(hmac_key.as_bytes())
            .expect("HMAC-SHA-384 can accept any key length");

        // When choosing a JWT implementation, be sure to check that it validates that the signing
        // algorithm declared in the token matches the signing algorithm you're verifying with.
        // The `jwt` crate does.
        let jwt = jwt.verify_with_key(&hmac).map_err(|e| {
            log::debug!("JWT failed to verify: {}", e);
            Error::Unauthorized(INVALID_TOKEN)
        })?;

        let (_header, claims) = jwt.into();

        // Expiry is the only revocation a stateless token gets.
        if claims.exp < OffsetDateTime::now_utc().unix_timestamp() {
            log::debug!("token expired");
            return Err(Error::Unauthorized(INVALID_TOKEN));
        }

        Ok(Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

impl MaybeAuthUser {
    /// If this is `Self(Some(AuthUser))`, return `AuthUser::user_id`
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|auth_user| auth_user.user_id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    ApiContext: FromRef<S>,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx: ApiContext = ApiContext::from_ref(state);

        // Get the value of the `Authorization` header, if it was sent at all.
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(Error::Unauthorized(MISSING_HEADER))?;

        Self::from_authorization(&ctx.config.hmac_key, auth_header)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    ApiContext: FromRef<S>,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx: ApiContext = ApiContext::from_ref(state);

        Ok(Self(
            // Get the value of the `Authorization` header, if it was sent at all.
            parts
                .headers
                .get(AUTHORIZATION)
                .map(|auth_header| AuthUser::from_authorization(&ctx.config.hmac_key, auth_header))
                // Transpose `Option<Result<T, E>>` to `Result<Option<T>, E>`
                .transpose()?,
        ))
    }
}

/// `axum::Json` for request bodies, but rejections are answered with our JSON error body
/// instead of axum's plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S, B> FromRequest<S, B> for JsonBody<T>
where
    axum::Json<T>: FromRequest<S, B, Rejection = axum::extract::rejection::JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = Error;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "Yabba Dabba Doo!";

    fn fred() -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            email: "fred@bedrock.example".into(),
            role: Role::User,
        }
    }

    fn header(value: &str) -> HeaderValue {
        HeaderValue::from_str(value).unwrap()
    }

    #[test]
    fn token_round_trips_through_header() {
        let user = fred();
        let jwt = user.to_jwt(KEY);

        let parsed = AuthUser::from_authorization(KEY, &header(&format!("Bearer {jwt}"))).unwrap();
        assert_eq!(parsed, user);
        assert!(!parsed.is_admin());
    }

    #[test]
    fn wrong_scheme_is_rejected() {
        let jwt = fred().to_jwt(KEY);

        let err = AuthUser::from_authorization(KEY, &header(&format!("Token {jwt}"))).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(MISSING_HEADER)));

        let err = AuthUser::from_authorization(KEY, &header("Bearer ")).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(MISSING_HEADER)));
    }

    #[test]
    fn token_signed_with_other_key_is_rejected() {
        let jwt = fred().to_jwt("some other key");

        let err = AuthUser::from_authorization(KEY, &header(&format!("Bearer {jwt}"))).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(INVALID_TOKEN)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let hmac = Hmac::<Sha384>::new_from_slice(KEY.as_bytes()).unwrap();
        let jwt = AuthUserClaims {
            sub: Uuid::new_v4(),
            email: "old@bedrock.example".into(),
            role: Role::User,
            exp: (OffsetDateTime::now_utc() - time::Duration::hours(1)).unix_timestamp(),
        }
        .sign_with_key(&hmac)
        .unwrap();

        let err = AuthUser::from_authorization(KEY, &header(&format!("Bearer {jwt}"))).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(INVALID_TOKEN)));
    }
}
