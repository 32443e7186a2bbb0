/// The configuration parameters for the application.
///
/// These can either be passed on the command line, or pulled from environment variables.
/// The latter is preferred as environment variables are one of the recommended ways to
/// get configuration from Kubernetes Secrets in deployment.
///
/// For development convenience, these can also be read from a `.env` file in the working
/// directory where the application is started.
///
/// See `.env.sample` in the repository root for details.
#[derive(clap::Parser, Default, Clone)]
pub struct Config {
    /// The connection URL for the Postgres database this application should use.
    #[clap(long, env)]
    pub database_url: String,

    /// The HMAC signing and verification key used for login tokens (JWTs).
    ///
    /// There is no required structure or format to this key as it's just fed into a hash function.
    /// In practice, it should be a long, random string that would be infeasible to brute-force.
    #[clap(long = "jwt-secret", env = "JWT_SECRET")]
    pub hmac_key: String,

    #[clap(long, env, default_value = "5005")]
    pub port: u16,

    /// The single browser origin allowed to make credentialed cross-origin requests.
    #[clap(long, env, default_value = "http://localhost:5173")]
    pub cors_origin: String,

    /// Root directory for uploaded files; avatars land in `<upload_dir>/avatars`.
    #[clap(long, env, default_value = "uploads")]
    pub upload_dir: String,

    /// Public base URL injected by Render. Takes priority over `BACKEND_BASE_URL`.
    #[clap(long, env)]
    pub render_external_url: Option<String>,

    #[clap(long, env)]
    pub backend_base_url: Option<String>,

    #[clap(long, env)]
    pub rapidapi_key: Option<String>,

    #[clap(long, env, default_value = "exercisedb.p.rapidapi.com")]
    pub rapidapi_host: String,

    #[clap(long, env, default_value = "https://exercisedb.p.rapidapi.com")]
    pub exercisedb_base_url: String,

    /// Pause between consecutive ExerciseDB requests, to stay under the RapidAPI rate limit.
    #[clap(long, env, default_value = "250")]
    pub exercisedb_throttle_ms: u64,

    #[clap(long, env)]
    pub huggingface_api_key: Option<String>,

    /// Legacy name for `HUGGINGFACE_API_KEY`.
    #[clap(long, env)]
    pub hf_api_key: Option<String>,

    /// Preferred chat model, optionally provider-qualified (`<model>:<provider>`).
    #[clap(long, env)]
    pub hf_model: Option<String>,

    #[clap(
        long,
        env,
        default_value = "https://router.huggingface.co/v1/chat/completions"
    )]
    pub inference_endpoint: String,
}

impl Config {
    pub fn inference_api_key(&self) -> Option<&str> {
        self.huggingface_api_key
            .as_deref()
            .or(self.hf_api_key.as_deref())
            .filter(|key| !key.is_empty())
    }

    /// Base URL used to build public links, when the deployment pins one.
    pub fn public_base_url(&self) -> Option<&str> {
        self.render_external_url
            .as_deref()
            .or(self.backend_base_url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_key_prefers_huggingface_name() {
        let config = Config {
            huggingface_api_key: Some("primary".into()),
            hf_api_key: Some("legacy".into()),
            ..Default::default()
        };
        assert_eq!(config.inference_api_key(), Some("primary"));

        let config = Config {
            hf_api_key: Some("legacy".into()),
            ..Default::default()
        };
        assert_eq!(config.inference_api_key(), Some("legacy"));

        assert_eq!(Config::default().inference_api_key(), None);
    }

    #[test]
    fn public_base_url_prefers_render() {
        let config = Config {
            render_external_url: Some("https://fw.onrender.com".into()),
            backend_base_url: Some("https://api.example.com".into()),
            ..Default::default()
        };
        assert_eq!(config.public_base_url(), Some("https://fw.onrender.com"));

        let config = Config {
            backend_base_url: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(config.public_base_url(), None);
    }
}
