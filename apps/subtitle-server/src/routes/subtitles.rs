use crate::handlers::subtitles as routes;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::{
	extract::FromRef,
	http::{header::CONTENT_TYPE, Method},
	Router,
};
use tower_http::cors::{Any, CorsLayer};

pub fn get_subtitles<S>() -> Router<S>
where
	S: Clone + Send + Sync + 'static,
	AppState: FromRef<S>,
{
	let cors = CorsLayer::new().allow_origin(Any).allow_methods([Method::GET, Method::POST]).allow_headers([CONTENT_TYPE]);

	Router::new()
		.route("/api/subtitles", post(routes::submit))
		.route("/api/subtitles/:video_id", get(routes::result))
		.route("/api/subtitles/:video_id/status", get(routes::status))
		.layer(cors)
}
