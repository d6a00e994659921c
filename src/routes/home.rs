use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Status {
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
}

pub fn home_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/health", get(|| async { "ok" }))
}

pub async fn home() -> Json<Status> {
    Json(Status {
        status: "active",
        message: "Welcome to the forum",
        version: env!("CARGO_PKG_VERSION"),
    })
}
