use crate::config::Config;
use crate::http::*;
use crate::models::{DynStore, Store};
use crate::upstream::exercisedb::{DynExerciseSource, ExerciseDbClient};
use crate::upstream::inference::{ChatBackend, DynChatBackend, InferenceClient};
use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use sqlx::PgPool;
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub async fn serve(config: Config, db: PgPool) -> anyhow::Result<()> {
    let port = config.port;

    let exercises = ExerciseDbClient::new(
        config.exercisedb_base_url.clone(),
        config.rapidapi_host.clone(),
        config.rapidapi_key.clone(),
    )
    .context("failed to build ExerciseDB client")?;

    let chat = InferenceClient::new(
        config.inference_endpoint.clone(),
        config.inference_api_key().map(str::to_string),
    )
    .context("failed to build inference client")?;

    if !chat.is_configured() {
        log::warn!("AI chat disabled: set HUGGINGFACE_API_KEY or HF_API_KEY to enable it");
    }

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .context("CORS_ORIGIN is not a valid header value")?,
        )
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let upload_dir = config.upload_dir.clone();

    let api_context = ApiContext {
        config: Arc::new(config),
        store: Arc::new(Store::new(db)) as DynStore,
        exercises: Arc::new(exercises) as DynExerciseSource,
        chat: Arc::new(chat) as DynChatBackend,
    };

    let app = api_router(api_context)
        // Avatars and anything else written under the upload directory.
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(cors);

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    log::info!("listening on http://{}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .context("error running HTTP server")
}

fn api_router(api_context: ApiContext) -> Router {
    Router::new()
        .merge(health::router())
        .merge(users::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(uploads::router())
        .merge(exercises::router())
        .merge(ai::router())
        // Enables logging. Use `RUST_LOG=tower_http=debug`
        .layer(TraceLayer::new_for_http())
        .with_state(api_context)
}
