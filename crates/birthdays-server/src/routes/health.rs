use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health — liveness plus a redacted view of the configuration.
pub async fn health(State(app): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "store": app.store.describe(),
        "publish_configured": app.github.is_configured(),
        "env_preview": app.config.env_preview(),
    }))
}
