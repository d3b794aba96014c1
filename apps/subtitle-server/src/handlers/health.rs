use axum::extract::{Json, State};
use axum::http::StatusCode;
use serde_json::{json, Value};
use tracing::instrument;

use crate::state::AppState;

#[axum::debug_handler]
#[instrument(name = "health", skip(state))]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
	match state.service.health().await {
		Ok(queue_depth) => (StatusCode::OK, Json(json!({ "status": "ok", "queue_depth": queue_depth }))),
		Err(e) => {
			tracing::warn!(error = %e, "Health check failed");
			(StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable", "error": e.to_string() })))
		}
	}
}
