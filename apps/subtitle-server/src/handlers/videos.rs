use axum::extract::{Json, State};
use subtitle_queue::CatalogView;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

#[axum::debug_handler]
#[instrument(name = "list_videos", skip(state))]
pub async fn list_videos(State(state): State<AppState>) -> Result<Json<CatalogView>, ApiError> {
	let view = state.service.get_catalog().await?;
	tracing::debug!(items = view.items.len(), origin = ?view.origin, "Serving catalog");
	Ok(Json(view))
}
