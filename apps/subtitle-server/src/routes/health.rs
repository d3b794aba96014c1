use crate::handlers::health as routes;
use crate::state::AppState;
use crate::telemetry::metrics_handler;
use axum::routing::get;
use axum::{extract::FromRef, Router};

pub fn get_health<S>() -> Router<S>
where
	S: Clone + Send + Sync + 'static,
	AppState: FromRef<S>,
{
	Router::new().route("/health", get(routes::health)).route("/metrics", get(metrics_handler))
}
