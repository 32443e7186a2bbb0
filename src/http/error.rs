use axum::extract::rejection::JsonRejection;
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sqlx::error::DatabaseError;
use std::borrow::Cow;
use std::collections::HashMap;

/// A common error type that can be used throughout the API.
///
/// Can be returned in a `Result` from an API handler function.
///
/// For convenience, this represents both API errors as well as internal recoverable errors,
/// and maps them to appropriate status codes along with at least a minimally useful error
/// message in a `{"error": ...}` JSON body.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Return `400 Bad Request` with a caller-facing message.
    #[error("{0}")]
    BadRequest(Cow<'static, str>),

    /// Return `401 Unauthorized`
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Return `403 Forbidden`
    #[error("Forbidden")]
    Forbidden,

    /// Return `404 Not Found`
    #[error("{0}")]
    NotFound(Cow<'static, str>),

    /// Return `409 Conflict`
    #[error("{0}")]
    Conflict(Cow<'static, str>),

    /// The body could not be read as the JSON a handler expects.
    /// Keeps the status axum picked (400, 415 or 422).
    #[error("{message}")]
    InvalidBody { status: StatusCode, message: String },

    /// Return `413 Payload Too Large`
    #[error("{0}")]
    PayloadTooLarge(Cow<'static, str>),

    /// Return `422 Unprocessable Entity`
    ///
    /// The body is `{"errors": {"field": ["message", ...]}}` so a form can highlight
    /// every offending input at once.
    #[error("error in the request body")]
    UnprocessableEntity {
        errors: HashMap<Cow<'static, str>, Vec<Cow<'static, str>>>,
    },

    /// Return `501 Not Implemented` for features whose credentials are not configured.
    #[error("{0}")]
    NotConfigured(Cow<'static, str>),

    /// An upstream API answered with a non-success status; pass it through.
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    /// Every chat model candidate failed. Returns `502 Bad Gateway`.
    #[error("No supported model available for your providers")]
    ModelsExhausted { details: String, tried: Vec<String> },

    /// Automatically return `500 Internal Server Error` on a `sqlx::Error`.
    ///
    /// The details are logged but never sent to the client.
    #[error("an error occurred with the database")]
    Sqlx(#[from] sqlx::Error),

    /// Return `500 Internal Server Error` on a `anyhow::Error`.
    #[error("Internal server error")]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Convenient constructor for `Error::UnprocessableEntity`.
    ///
    /// Multiple for the same key are collected into a list for that key.
    pub fn unprocessable_entity<K, V>(errors: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: Into<Cow<'static, str>>,
    {
        let mut error_map = HashMap::new();

        for (key, val) in errors {
            error_map
                .entry(key.into())
                .or_insert_with(Vec::new)
                .push(val.into());
        }

        Self::UnprocessableEntity { errors: error_map }
    }

    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidBody { status, .. } => *status,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotConfigured(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Upstream { status, .. } => *status,
            Self::ModelsExhausted { .. } => StatusCode::BAD_GATEWAY,
            Self::Sqlx(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

/// Axum allows you to return `Result` from handler functions, but the error type
/// also must be some sort of response type.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            Self::UnprocessableEntity { errors } => {
                #[derive(serde::Serialize)]
                struct Errors {
                    errors: HashMap<Cow<'static, str>, Vec<Cow<'static, str>>>,
                }

                return (status, Json(Errors { errors })).into_response();
            }
            Self::ModelsExhausted { details, tried } => {
                #[derive(serde::Serialize)]
                struct Exhausted {
                    error: &'static str,
                    details: String,
                    tried: Vec<String>,
                }

                return (
                    status,
                    Json(Exhausted {
                        error: "No supported model available for your providers",
                        details,
                        tried,
                    }),
                )
                    .into_response();
            }
            Self::Unauthorized(message) => {
                // Include the `WWW-Authenticate` challenge required by RFC 6750.
                let mut headers = HeaderMap::new();
                headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));

                return (
                    status,
                    headers,
                    Json(ErrorBody {
                        error: message.to_string(),
                    }),
                )
                    .into_response();
            }
            // Log internal errors; the client only ever sees the generic `Display` text.
            Self::Sqlx(ref e) => {
                log::error!("SQLx error: {:?}", e);
            }
            Self::Anyhow(ref e) => {
                log::error!("Generic error: {:?}", e);
            }
            _ => (),
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// A little helper trait for more easily converting database constraint errors into API errors.
///
/// ```rust,ignore
/// let user_id = sqlx::query_scalar(
///     r#"insert into "user" (email, password_hash) values ($1, $2) returning user_id"#,
/// )
/// .bind(email)
/// .bind(password_hash)
/// .fetch_one(&pool)
/// .await
/// .on_constraint("user_email_key", |_| Error::Conflict("Email already exists".into()))?;
/// ```
pub trait ResultExt<T> {
    /// If `self` contains a SQLx database constraint error with the given name,
    /// transform the error.
    ///
    /// Otherwise, the result is passed through unchanged.
    fn on_constraint(
        self,
        name: &str,
        f: impl FnOnce(Box<dyn DatabaseError>) -> Error,
    ) -> Result<T, Error>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<Error>,
{
    fn on_constraint(
        self,
        name: &str,
        map_err: impl FnOnce(Box<dyn DatabaseError>) -> Error,
    ) -> Result<T, Error> {
        self.map_err(|e| match e.into() {
            Error::Sqlx(sqlx::Error::Database(dbe)) if dbe.constraint() == Some(name) => {
                map_err(dbe)
            }
            e => e,
        })
    }
}
