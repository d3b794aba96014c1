use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use subtitle_queue::QueueError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
	#[error("rate limit exceeded")]
	RateLimited { retry_after: Option<Duration> },

	#[error("invalid request: {0}")]
	InvalidRequest(String),

	#[error("not found: {0}")]
	NotFound(String),

	#[error(transparent)]
	Queue(#[from] QueueError),
}

#[derive(Serialize)]
struct ErrorBody {
	error: &'static str,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	retry_after_secs: Option<u64>,
}

impl ApiError {
	const fn status_code(&self) -> StatusCode {
		match self {
			Self::RateLimited { .. } | Self::Queue(QueueError::AdmissionDenied { .. }) => StatusCode::TOO_MANY_REQUESTS,
			Self::InvalidRequest(_) | Self::Queue(QueueError::InvalidConfig(_)) => StatusCode::BAD_REQUEST,
			Self::NotFound(_) | Self::Queue(QueueError::NotFound(_)) => StatusCode::NOT_FOUND,
			Self::Queue(QueueError::StoreUnavailable(_) | QueueError::SourceUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
			Self::Queue(QueueError::Store(_) | QueueError::Serialization(_) | QueueError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	const fn code(&self) -> &'static str {
		match self {
			Self::RateLimited { .. } | Self::Queue(QueueError::AdmissionDenied { .. }) => "rate_limited",
			Self::InvalidRequest(_) | Self::Queue(QueueError::InvalidConfig(_)) => "invalid_request",
			Self::NotFound(_) | Self::Queue(QueueError::NotFound(_)) => "not_found",
			Self::Queue(QueueError::StoreUnavailable(_)) => "store_unavailable",
			Self::Queue(QueueError::SourceUnavailable(_)) => "source_unavailable",
			Self::Queue(_) => "internal_error",
		}
	}

	const fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::RateLimited { retry_after } | Self::Queue(QueueError::AdmissionDenied { retry_after }) => *retry_after,
			_ => None,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		if status.is_server_error() {
			tracing::error!(error = %self, "Request failed");
		}

		let retry_after_secs = self.retry_after().map(|after| after.as_secs().max(1));
		// Internal details stay in the logs.
		let message = if status == StatusCode::INTERNAL_SERVER_ERROR { "an internal server error occurred".to_string() } else { self.to_string() };
		let body = ErrorBody {
			error: self.code(),
			message,
			retry_after_secs,
		};

		let mut response = (status, Json(body)).into_response();
		if let Some(secs) = retry_after_secs {
			response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
		}
		response
	}
}
