use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::error::Error;
use crate::gateway_util::AppStateData;

pub const POCKETCODE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A handler for a simple liveness check
pub async fn status_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": POCKETCODE_VERSION }))
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// A handler for a readiness check that includes the document store
pub async fn readiness_handler(
    State(app_state): State<AppStateData>,
) -> Result<impl IntoResponse, Error> {
    app_state.store.health().await?;
    Ok(Json(json!({ "status": "ok", "store": app_state.store.kind() })))
}
