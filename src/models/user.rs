use crate::http::types::{Day, Timestamptz};
use crate::http::{Error, Result, ResultExt};
use crate::models::country;
use anyhow::Context;
use argon2::{password_hash::SaltString, Argon2, PasswordHash};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(anyhow::anyhow!("unknown gender {:?}", s)),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(anyhow::anyhow!("unknown role {:?}", s)),
        }
    }
}

/// The body of `POST /api/users`.
///
/// Every field is optional here so that a missing one is reported next to the others as a
/// validation error, not as a failure to deserialize.
#[derive(serde::Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterUser {
    pub email: Option<String>,
    pub password: Option<String>,
    pub birthday: Option<Day>,
    pub gender: Option<Gender>,
    pub country_code: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub profile_image: Option<String>,
}

/// A registration that passed validation: trimmed, email lowercased, country code uppercased.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub birthday: Day,
    pub gender: Gender,
    pub country_code: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub profile_image: Option<String>,
}

fn blank_to_none(field: Option<String>) -> Option<String> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl RegisterUser {
    /// Normalize the input and check it, collecting every problem into one 422.
    pub fn validate(self) -> Result<NewUser> {
        let email = blank_to_none(self.email).map(|email| email.to_lowercase());
        let password = self.password.filter(|password| !password.is_empty());
        let country_code = blank_to_none(self.country_code).map(|code| code.to_uppercase());

        let mut errors = Vec::new();

        if email.is_none() {
            errors.push(("email", "is required".to_string()));
        }
        if password.is_none() {
            errors.push(("password", "is required".to_string()));
        }
        if self.birthday.is_none() {
            errors.push(("birthday", "is required".to_string()));
        }
        if self.gender.is_none() {
            errors.push(("gender", "is required".to_string()));
        }
        if let Some(code) = &country_code {
            if !country::is_iso_alpha2(code) {
                errors.push((
                    "countryCode",
                    format!("\"{}\" is not a valid ISO country code", code),
                ));
            }
        }

        match (email, password, self.birthday, self.gender) {
            (Some(email), Some(password), Some(birthday), Some(gender)) if errors.is_empty() => {
                Ok(NewUser {
                    email,
                    password,
                    birthday,
                    gender,
                    country_code,
                    first_name: blank_to_none(self.first_name),
                    last_name: blank_to_none(self.last_name),
                    nick_name: blank_to_none(self.nick_name),
                    profile_image: blank_to_none(self.profile_image),
                })
            }
            _ => Err(Error::unprocessable_entity(errors)),
        }
    }
}

// Missing credentials fall through to the usual 401.
#[derive(serde::Deserialize, Default)]
#[serde(default)]
pub struct LoginUser {
    pub email: String,
    pub password: String,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub birthday: Day,
    pub gender: Gender,
    pub country_code: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub profile_image: Option<String>,
    pub role: Role,
    pub created_at: Timestamptz,
    pub updated_at: Timestamptz,
}

// `gender` and `role` are stored as constrained `text`; they're parsed after the fact
// rather than teaching SQLx about the enums.
#[derive(FromRow)]
struct UserFromQuery {
    user_id: Uuid,
    email: String,
    password_hash: String,
    birthday: Day,
    gender: String,
    country_code: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    nick_name: Option<String>,
    profile_image: Option<String>,
    role: String,
    created_at: Timestamptz,
    updated_at: Timestamptz,
}

impl UserFromQuery {
    fn into_user(self) -> Result<User> {
        Ok(User {
            id: self.user_id,
            email: self.email,
            password_hash: self.password_hash,
            birthday: self.birthday,
            gender: self.gender.parse()?,
            country_code: self.country_code,
            first_name: self.first_name,
            last_name: self.last_name,
            nick_name: self.nick_name,
            profile_image: self.profile_image,
            role: self.role.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct UserController {
    pool: PgPool,
}

impl UserController {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub type DynUserCtrl = Arc<dyn UserCtrlTrait + Send + Sync>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserCtrlTrait {
    /// Expects an already normalized and validated `NewUser`.
    async fn create_user(&self, new_user: NewUser) -> Result<User>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn user_by_id(&self, user_id: Uuid) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn set_profile_image(&self, user_id: Uuid, url: &str) -> Result<Option<User>>;
}

#[async_trait]
impl UserCtrlTrait for UserController {
    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let password_hash = hash_password(new_user.password.clone()).await?;

        let user = sqlx::query_as::<_, UserFromQuery>(
            // language=PostgreSQL
            r#"
                insert into "user" (
                    email, password_hash, birthday, gender, country_code,
                    first_name, last_name, nick_name, profile_image
                )
                values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                returning
                    user_id, email, password_hash, birthday, gender, country_code,
                    first_name, last_name, nick_name, profile_image, role, created_at, updated_at
            "#,
        )
        .bind(&new_user.email)
        .bind(password_hash)
        .bind(new_user.birthday)
        .bind(new_user.gender.as_str())
        .bind(&new_user.country_code)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.nick_name)
        .bind(&new_user.profile_image)
        .fetch_one(&self.pool)
        .await
        .on_constraint("user_email_key", |_| {
            Error::Conflict("Email already exists".into())
        })?;

        user.into_user()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, UserFromQuery>(
            r#"
                select
                    user_id, email, password_hash, birthday, gender, country_code,
                    first_name, last_name, nick_name, profile_image, role, created_at, updated_at
                from "user" where email = $1
            "#,
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?
        .map(UserFromQuery::into_user)
        .transpose()
    }

    async fn user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        sqlx::query_as::<_, UserFromQuery>(
            r#"
                select
                    user_id, email, password_hash, birthday, gender, country_code,
                    first_name, last_name, nick_name, profile_image, role, created_at, updated_at
                from "user" where user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(UserFromQuery::into_user)
        .transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        sqlx::query_as::<_, UserFromQuery>(
            r#"
                select
                    user_id, email, password_hash, birthday, gender, country_code,
                    first_name, last_name, nick_name, profile_image, role, created_at, updated_at
                from "user"
                order by created_at desc
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(UserFromQuery::into_user)
        .collect()
    }

    async fn set_profile_image(&self, user_id: Uuid, url: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, UserFromQuery>(
            r#"
                update "user"
                set profile_image = $1
                where user_id = $2
                returning
                    user_id, email, password_hash, birthday, gender, country_code,
                    first_name, last_name, nick_name, profile_image, role, created_at, updated_at
            "#,
        )
        .bind(url)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(UserFromQuery::into_user)
        .transpose()
    }
}

pub(crate) async fn hash_password(password: String) -> Result<String> {
    // Argon2 hashing is designed to be computationally intensive,
    // so we need to do this on a blocking thread.
    tokio::task::spawn_blocking(move || -> Result<String> {
        let salt = SaltString::generate(rand::thread_rng());
        Ok(PasswordHash::generate(Argon2::default(), password, &salt)
            .map_err(|e| anyhow::anyhow!("failed to generate password hash: {}", e))?
            .to_string())
    })
    .await
    .context("panic in generating password hash")?
}
