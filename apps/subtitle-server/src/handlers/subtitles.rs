use axum::{
	extract::{ConnectInfo, Json, Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use subtitle_queue::{extract_video_id, ErrorKind, JobRecord, JobStatus, QueueError, ResultEntry, SubmitOutcome};
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
	pub url: String,
	#[serde(default)]
	pub video_id: Option<String>,
	#[serde(default)]
	pub target_language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LanguageQuery {
	#[serde(default)]
	pub target_language: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
	video_id: String,
	status: JobStatus,
	outcome: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	job: Option<JobRef>,
	#[serde(skip_serializing_if = "Option::is_none")]
	result: Option<ResultEntry>,
}

/// The parts of a job record a submitting client needs.
#[derive(Debug, Serialize)]
struct JobRef {
	job_id: String,
	retry_count: u32,
}

impl From<&JobRecord> for JobRef {
	fn from(record: &JobRecord) -> Self {
		Self {
			job_id: record.job_id.to_string(),
			retry_count: record.retry_count,
		}
	}
}

/// Rate-limit identity: first `X-Forwarded-For` hop, else the peer address.
#[must_use]
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
	headers
		.get("x-forwarded-for")
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.split(',').next())
		.map(str::trim)
		.filter(|hop| !hop.is_empty())
		.map(str::to_string)
		.or_else(|| peer.map(|addr| addr.ip().to_string()))
		.unwrap_or_else(|| "unknown".to_string())
}

#[axum::debug_handler]
#[instrument(name = "submit_subtitles", skip_all)]
pub async fn submit(State(state): State<AppState>, connect_info: Option<ConnectInfo<SocketAddr>>, headers: HeaderMap, Json(request): Json<SubmitRequest>) -> Result<Response, ApiError> {
	let client = client_id(&headers, connect_info.map(|ConnectInfo(addr)| addr));
	tracing::debug!(client = %client, url = %request.url, "Subtitle request");
	let admission = state.service.admit(&client).await?;
	if !admission.allowed {
		return Err(ApiError::RateLimited {
			retry_after: admission.retry_after,
		});
	}

	let video_id = request
		.video_id
		.filter(|id| !id.trim().is_empty())
		.or_else(|| extract_video_id(&request.url))
		.ok_or_else(|| ApiError::InvalidRequest(format!("could not determine a video id from {}", request.url)))?;

	let outcome = state.service.submit_work(&video_id, &request.url, request.target_language.as_deref()).await?;
	let label = outcome.as_str();
	let (code, body) = match outcome {
		SubmitOutcome::AlreadyDone(entry) => (
			StatusCode::OK,
			SubmitResponse {
				video_id,
				status: JobStatus::Done,
				outcome: label,
				job: None,
				result: Some(entry),
			},
		),
		SubmitOutcome::AlreadyProcessing(record) => (
			StatusCode::ACCEPTED,
			SubmitResponse {
				video_id,
				status: record.as_ref().map_or(JobStatus::Processing, |record| record.status),
				outcome: label,
				job: record.as_ref().map(JobRef::from),
				result: None,
			},
		),
		SubmitOutcome::NewlyQueued(record) => (
			StatusCode::ACCEPTED,
			SubmitResponse {
				video_id,
				status: record.status,
				outcome: label,
				job: Some(JobRef::from(&record)),
				result: None,
			},
		),
	};

	Ok((code, Json(body)).into_response())
}

#[axum::debug_handler]
#[instrument(name = "subtitle_status", skip(state))]
pub async fn status(State(state): State<AppState>, Path(video_id): Path<String>, Query(query): Query<LanguageQuery>) -> Result<Response, ApiError> {
	let view = state.service.get_status(&video_id, query.target_language.as_deref()).await?;
	Ok(Json(view).into_response())
}

#[axum::debug_handler]
#[instrument(name = "get_subtitles", skip(state))]
pub async fn result(State(state): State<AppState>, Path(video_id): Path<String>, Query(query): Query<LanguageQuery>) -> Result<Response, ApiError> {
	let target = query.target_language.as_deref();
	match state.service.get_result(&video_id, target).await {
		Ok(entry) => Ok(Json(entry).into_response()),
		Err(QueueError::NotFound(_)) => {
			let view = state.service.get_status(&video_id, target).await?;
			match view.status {
				JobStatus::Queued | JobStatus::Processing => Ok((StatusCode::ACCEPTED, Json(view)).into_response()),
				JobStatus::Error => Err(ApiError::NotFound(format!(
					"{video_id} failed: {}",
					view.error_kind.map_or("unknown", ErrorKind::as_str)
				))),
				JobStatus::Done => Err(ApiError::NotFound(format!("{video_id} has no result for the current settings"))),
			}
		}
		Err(e) => Err(e.into()),
	}
}
