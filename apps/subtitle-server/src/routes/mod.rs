mod health;
mod subtitles;
mod videos;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use health::get_health;
pub use subtitles::get_subtitles;
pub use videos::get_videos;

pub fn app(state: AppState) -> Router {
	Router::new()
		.merge(get_subtitles())
		.merge(get_videos())
		.merge(get_health())
		.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
		.with_state(state)
}
