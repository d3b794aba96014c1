use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use subtitle_queue::{
	AudioPayload, CatalogItem, CatalogSource, Config, EngineError, Engines, ManualClock, MemoryStore, Retriever, Segment, SharedClock, SourceInfo, SubtitleService, TranscribeParams, Transcriber,
	Transcript, Translator, WorkerPool,
};
use subtitle_server::routes::app;
use subtitle_server::state::AppState;
use tower::ServiceExt;

struct Engine;

#[async_trait]
impl Retriever for Engine {
	async fn probe(&self, _source_ref: &str) -> Result<SourceInfo, EngineError> {
		Ok(SourceInfo {
			title: Some("A talk".into()),
			uploader: None,
			duration_sec: Some(30.0),
		})
	}

	async fn fetch_audio(&self, _source_ref: &str) -> Result<AudioPayload, EngineError> {
		Ok(AudioPayload {
			bytes: Bytes::from_static(b"RIFF"),
			format: "wav".into(),
			duration_sec: Some(30.0),
		})
	}
}

#[async_trait]
impl Transcriber for Engine {
	async fn transcribe(&self, _audio: &AudioPayload, _params: &TranscribeParams) -> Result<Transcript, EngineError> {
		Ok(Transcript::from_segments(vec![Segment { start: 0.0, end: 2.0, text: "hello there".into() }], Some("en".into())))
	}
}

#[async_trait]
impl Translator for Engine {
	async fn translate(&self, segments: &[Segment], _source_lang: Option<&str>, target_lang: &str) -> Result<Transcript, EngineError> {
		Ok(Transcript::from_segments(segments.to_vec(), Some(target_lang.to_string())))
	}
}

#[async_trait]
impl CatalogSource for Engine {
	async fn list_items(&self) -> Result<Vec<CatalogItem>, EngineError> {
		Ok(vec![CatalogItem {
			video_id: "dQw4w9WgXcQ".into(),
			title: Some("A talk".into()),
			uploader: None,
			duration_sec: Some(30.0),
			source_url: None,
			extra: HashMap::new(),
		}])
	}
}

fn setup() -> (Router, Arc<WorkerPool>) {
	let clock: SharedClock = ManualClock::at_epoch_secs(1_700_000_000);
	let config = Config {
		status_ttl: Duration::from_secs(60),
		rate_limit_window: Duration::from_secs(60),
		rate_limit_max: 3,
		..Config::default()
	};
	let engine = Arc::new(Engine);
	let service = SubtitleService::new(config, Arc::new(MemoryStore::with_clock(clock.clone())), clock, engine.clone()).unwrap();
	let pool = service.worker_pool(Engines {
		retriever: engine.clone(),
		transcriber: engine.clone(),
		translator: engine,
	});
	(app(AppState::new(service)), pool)
}

fn submit_request(url: &str) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri("/api/subtitles")
		.header(header::CONTENT_TYPE, "application/json")
		.header("x-forwarded-for", "203.0.113.7")
		.body(Body::from(json!({ "url": url }).to_string()))
		.unwrap()
}

fn get(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
	serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_submit_is_deduplicated() {
	let (router, _pool) = setup();

	let first = router.clone().oneshot(submit_request("https://youtu.be/dQw4w9WgXcQ")).await.unwrap();
	assert_eq!(first.status(), StatusCode::ACCEPTED);
	let first = body_json(first).await;
	assert_eq!(first["outcome"], "newly_queued");
	assert_eq!(first["status"], "queued");

	let second = router.clone().oneshot(submit_request("https://www.youtube.com/watch?v=dQw4w9WgXcQ")).await.unwrap();
	assert_eq!(second.status(), StatusCode::ACCEPTED);
	let second = body_json(second).await;
	assert_eq!(second["outcome"], "already_processing");
	assert_eq!(second["job"]["job_id"], first["job"]["job_id"]);

	let status = router.oneshot(get("/api/subtitles/dQw4w9WgXcQ/status")).await.unwrap();
	assert_eq!(status.status(), StatusCode::OK);
	assert_eq!(body_json(status).await["status"], "queued");
}

#[tokio::test]
async fn test_result_after_worker_runs() {
	let (router, pool) = setup();
	router.clone().oneshot(submit_request("https://youtu.be/dQw4w9WgXcQ")).await.unwrap();

	let pending = router.clone().oneshot(get("/api/subtitles/dQw4w9WgXcQ")).await.unwrap();
	assert_eq!(pending.status(), StatusCode::ACCEPTED);

	assert!(pool.run_once().await.unwrap());

	let done = router.clone().oneshot(get("/api/subtitles/dQw4w9WgXcQ")).await.unwrap();
	assert_eq!(done.status(), StatusCode::OK);
	assert_eq!(body_json(done).await["text"], "hello there");

	let again = router.oneshot(submit_request("https://youtu.be/dQw4w9WgXcQ")).await.unwrap();
	assert_eq!(again.status(), StatusCode::OK);
	assert_eq!(body_json(again).await["outcome"], "already_done");
}

#[tokio::test]
async fn test_rate_limit_returns_retry_after() {
	let (router, _pool) = setup();
	for _ in 0..3 {
		let response = router.clone().oneshot(submit_request("https://youtu.be/dQw4w9WgXcQ")).await.unwrap();
		assert_eq!(response.status(), StatusCode::ACCEPTED);
	}

	let denied = router.oneshot(submit_request("https://youtu.be/dQw4w9WgXcQ")).await.unwrap();
	assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
	assert!(denied.headers().contains_key(header::RETRY_AFTER));
	assert_eq!(body_json(denied).await["error"], "rate_limited");
}

#[tokio::test]
async fn test_unusable_url_is_rejected() {
	let (router, _pool) = setup();
	let response = router.oneshot(submit_request("https://example.com/some/page")).await.unwrap();
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_unknown_video_is_not_found() {
	let (router, _pool) = setup();
	let status = router.clone().oneshot(get("/api/subtitles/nothing/status")).await.unwrap();
	assert_eq!(status.status(), StatusCode::NOT_FOUND);
	let result = router.oneshot(get("/api/subtitles/nothing?target_language=ru")).await.unwrap();
	assert_eq!(result.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_catalog() {
	let (router, _pool) = setup();
	let health = router.clone().oneshot(get("/health")).await.unwrap();
	assert_eq!(health.status(), StatusCode::OK);
	assert_eq!(body_json(health).await["queue_depth"], 0);

	let videos = router.oneshot(get("/api/videos")).await.unwrap();
	assert_eq!(videos.status(), StatusCode::OK);
	let videos = body_json(videos).await;
	assert_eq!(videos["items"][0]["video_id"], "dQw4w9WgXcQ");
	assert_eq!(videos["origin"], "source");
}
