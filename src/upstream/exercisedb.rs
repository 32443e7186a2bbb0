//! Client for the ExerciseDB API on RapidAPI.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

const GIF_FALLBACK_BASE: &str = "https://v2.exercisedb.io/image";

#[derive(thiserror::Error, Debug)]
pub enum ExerciseDbError {
    #[error("Missing RAPIDAPI_KEY")]
    MissingKey,

    #[error("request to ExerciseDB failed: {0}")]
    Http(#[from] reqwest::Error),

    /// ExerciseDB answered, but not with a success status.
    #[error("[{status}] {message}")]
    Status { status: StatusCode, message: String },

    #[error("unexpected response from ExerciseDB: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One exercise as returned by ExerciseDB.
///
/// Only the fields this service looks at are typed; everything else is kept in `extra`
/// and passed through to clients untouched.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_part: Option<String>,
    #[serde(default)]
    pub gif_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Exercise {
    /// The key used to de-duplicate exercises coming from several target lists.
    pub fn dedup_key(&self) -> Option<&str> {
        self.id.as_deref().or(self.name.as_deref())
    }

    /// Fill `gif_url` from the alternative image fields, or from the CDN by id.
    pub fn with_gif(mut self) -> Self {
        if self.gif_url.as_deref().map_or(false, |url| !url.is_empty()) {
            return self;
        }

        let from_extra = |key: &str| {
            self.extra
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let fallback_id = self
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| from_extra("uuid"))
            .or_else(|| self.name.clone().filter(|name| !name.is_empty()));

        self.gif_url = from_extra("image")
            .or_else(|| from_extra("imageUrl"))
            .or_else(|| {
                fallback_id
                    .map(|id| format!("{}/{}.gif", GIF_FALLBACK_BASE, urlencoding::encode(&id)))
            });
        self
    }
}

pub type DynExerciseSource = Arc<dyn ExerciseSource + Send + Sync>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExerciseSource {
    /// The RapidAPI host this source talks to, reported by the health check.
    fn host(&self) -> String;

    /// `Ok(true)` if ExerciseDB accepted our credentials.
    async fn ping(&self) -> Result<bool, ExerciseDbError>;

    /// `target` must already be an ExerciseDB target key.
    async fn exercises_by_target(&self, target: &str) -> Result<Vec<Exercise>, ExerciseDbError>;

    async fn exercise_by_id(&self, id: &str) -> Result<Option<Exercise>, ExerciseDbError>;

    async fn target_list(&self) -> Result<Value, ExerciseDbError>;
}

#[derive(Clone)]
pub struct ExerciseDbClient {
    http: reqwest::Client,
    base_url: String,
    host: String,
    api_key: Option<String>,
}

impl ExerciseDbClient {
    pub fn new(
        base_url: impl Into<String>,
        host: impl Into<String>,
        api_key: Option<String>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fitness-world-api/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            host: host.into(),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ExerciseDbError> {
        let api_key = self.api_key.as_deref().ok_or(ExerciseDbError::MissingKey)?;

        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("x-rapidapi-key", api_key)
            .header("x-rapidapi-host", &self.host)
            .send()
            .await?;

        Ok(response)
    }

    /// Read the body as JSON, turning a non-success status into `ExerciseDbError::Status`.
    async fn json(response: reqwest::Response, what: &str) -> Result<Value, ExerciseDbError> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("Failed to fetch {}", what));
            return Err(ExerciseDbError::Status { status, message });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ExerciseSource for ExerciseDbClient {
    fn host(&self) -> String {
        self.host.clone()
    }

    async fn ping(&self) -> Result<bool, ExerciseDbError> {
        let response = self.get("/exercises/targetList").await?;
        Ok(response.status().is_success())
    }

    async fn exercises_by_target(&self, target: &str) -> Result<Vec<Exercise>, ExerciseDbError> {
        let response = self
            .get(&format!("/exercises/target/{}", urlencoding::encode(target)))
            .await?;
        let body = Self::json(response, "exercises").await?;

        // Anything but an array (e.g. an error object with a 200) counts as "nothing found".
        match body {
            Value::Array(items) => Ok(decode_exercises(items, target)),
            _ => Ok(Vec::new()),
        }
    }

    async fn exercise_by_id(&self, id: &str) -> Result<Option<Exercise>, ExerciseDbError> {
        let response = self
            .get(&format!("/exercises/exercise/{}", urlencoding::encode(id)))
            .await?;
        let body = Self::json(response, "exercise").await?;

        // Some plans return a single-element array instead of an object.
        let exercise = match body {
            Value::Array(items) => items.into_iter().next(),
            Value::Null => None,
            other => Some(other),
        };

        match exercise {
            Some(value) => Ok(Some(serde_json::from_value::<Exercise>(value)?.with_gif())),
            None => Ok(None),
        }
    }

    async fn target_list(&self) -> Result<Value, ExerciseDbError> {
        let response = self.get("/exercises/targetList").await?;
        Self::json(response, "targets").await
    }
}

/// Decode each item on its own so one odd record doesn't cost the whole list.
fn decode_exercises(items: Vec<Value>, target: &str) -> Vec<Exercise> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Exercise>(item) {
            Ok(exercise) => Some(exercise.with_gif()),
            Err(e) => {
                log::warn!("skipping undecodable ExerciseDB item for {}: {}", target, e);
                None
            }
        })
        .collect()
}
