//! Combines the API and UI routes from all modules into a unified router.

use axum::{routing::get, Json, Router};
use std::sync::Arc;

use crate::shared::state::AppState;

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Configure all routes from all modules.
pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .merge(crate::canvas::configure())
        .merge(crate::canvas::ui::configure_ui())
        .merge(crate::directory::configure())
}
