use crate::http::ApiContext;
use axum::routing::get;
use axum::{Json, Router};

pub(crate) fn router() -> Router<ApiContext> {
    Router::new().route("/api/health", get(health))
}

#[derive(serde::Serialize)]
struct Health {
    ok: bool,
}

async fn health() -> Json<Health> {
    Json(Health { ok: true })
}
