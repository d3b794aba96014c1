#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use subtitle_queue::{
	AudioPayload, CatalogItem, CatalogSource, Config, EngineError, Engines, KvStore, MemoryStore, QueueError, Retriever, Segment, SharedClock, SharedStore, SourceInfo, SubtitleService,
	TranscribeParams, Transcriber, Transcript, Translator, WorkerPool,
};

pub struct FakeRetriever {
	pub duration_sec: f64,
	pub failing: AtomicBool,
	pub probes: AtomicUsize,
	pub fetches: AtomicUsize,
}

impl FakeRetriever {
	pub fn with_duration(duration_sec: f64) -> Arc<Self> {
		Arc::new(Self {
			duration_sec,
			failing: AtomicBool::new(false),
			probes: AtomicUsize::new(0),
			fetches: AtomicUsize::new(0),
		})
	}
}

#[async_trait]
impl Retriever for FakeRetriever {
	async fn probe(&self, source_ref: &str) -> Result<SourceInfo, EngineError> {
		self.probes.fetch_add(1, Ordering::SeqCst);
		if self.failing.load(Ordering::SeqCst) {
			return Err(EngineError::Retrieval(format!("{source_ref} is private")));
		}
		Ok(SourceInfo {
			title: Some("A talk".into()),
			uploader: Some("someone".into()),
			duration_sec: Some(self.duration_sec),
		})
	}

	async fn fetch_audio(&self, _source_ref: &str) -> Result<AudioPayload, EngineError> {
		self.fetches.fetch_add(1, Ordering::SeqCst);
		Ok(AudioPayload {
			bytes: Bytes::from_static(b"RIFF....WAVE"),
			format: "wav".into(),
			duration_sec: Some(self.duration_sec),
		})
	}
}

#[derive(Default)]
pub struct FakeTranscriber {
	pub calls: AtomicUsize,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
	async fn transcribe(&self, _audio: &AudioPayload, params: &TranscribeParams) -> Result<Transcript, EngineError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let segments = vec![
			Segment { start: 0.0, end: 1.5, text: "hello".into() },
			Segment { start: 1.5, end: 3.0, text: "world".into() },
		];
		let mut transcript = Transcript::from_segments(segments, params.language.clone().or_else(|| Some("en".into())));
		transcript.meta.insert("model".into(), serde_json::json!(params.model));
		Ok(transcript)
	}
}

#[derive(Default)]
pub struct FakeTranslator {
	pub calls: AtomicUsize,
}

#[async_trait]
impl Translator for FakeTranslator {
	async fn translate(&self, segments: &[Segment], _source_lang: Option<&str>, target_lang: &str) -> Result<Transcript, EngineError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let translated = segments
			.iter()
			.map(|segment| Segment {
				text: format!("[{target_lang}] {}", segment.text),
				..segment.clone()
			})
			.collect();
		Ok(Transcript::from_segments(translated, Some(target_lang.to_string())))
	}
}

#[derive(Default)]
pub struct StaticCatalog {
	pub calls: AtomicUsize,
}

#[async_trait]
impl CatalogSource for StaticCatalog {
	async fn list_items(&self) -> Result<Vec<CatalogItem>, EngineError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Ok(vec![CatalogItem {
			video_id: "dQw4w9WgXcQ".into(),
			title: Some("A talk".into()),
			uploader: None,
			duration_sec: Some(212.0),
			source_url: Some("https://youtu.be/dQw4w9WgXcQ".into()),
			extra: HashMap::new(),
		}])
	}
}

pub struct Harness {
	pub service: SubtitleService,
	pub pool: Arc<WorkerPool>,
	pub retriever: Arc<FakeRetriever>,
	pub transcriber: Arc<FakeTranscriber>,
	pub translator: Arc<FakeTranslator>,
	pub catalog: Arc<StaticCatalog>,
}

pub fn test_config() -> Config {
	Config {
		status_ttl: Duration::from_secs(60),
		max_source_duration: Duration::from_secs(3600),
		queue_poll_interval_ms: 10,
		rate_limit_window: Duration::from_secs(60),
		rate_limit_max: 3,
		..Config::default()
	}
}

pub fn harness(config: Config, clock: SharedClock, source_duration_sec: f64) -> Harness {
	let store = Arc::new(MemoryStore::with_clock(clock.clone()));
	harness_with_store(config, clock, store, source_duration_sec)
}

pub fn harness_with_store(config: Config, clock: SharedClock, store: SharedStore, source_duration_sec: f64) -> Harness {
	let catalog = Arc::new(StaticCatalog::default());
	let service = SubtitleService::new(config, store, clock, catalog.clone()).unwrap();

	let retriever = FakeRetriever::with_duration(source_duration_sec);
	let transcriber = Arc::new(FakeTranscriber::default());
	let translator = Arc::new(FakeTranslator::default());
	let pool = service.worker_pool(Engines {
		retriever: retriever.clone(),
		transcriber: transcriber.clone(),
		translator: translator.clone(),
	});

	Harness {
		service,
		pool,
		retriever,
		transcriber,
		translator,
		catalog,
	}
}

fn unavailable<T>() -> Result<T, QueueError> {
	Err(QueueError::StoreUnavailable("connection refused".into()))
}

/// A store whose every call fails as if the server were unreachable.
pub struct DownStore;

#[async_trait]
impl KvStore for DownStore {
	async fn get(&self, _: &str) -> Result<Option<Vec<u8>>, QueueError> {
		unavailable()
	}
	async fn set_ex(&self, _: &str, _: &[u8], _: Duration) -> Result<(), QueueError> {
		unavailable()
	}
	async fn set_nx_ex(&self, _: &str, _: &[u8], _: Duration) -> Result<bool, QueueError> {
		unavailable()
	}
	async fn compare_and_swap(&self, _: &str, _: &[u8], _: &[u8], _: Duration) -> Result<bool, QueueError> {
		unavailable()
	}
	async fn delete_if_equals(&self, _: &str, _: &[u8]) -> Result<bool, QueueError> {
		unavailable()
	}
	async fn delete(&self, _: &str) -> Result<bool, QueueError> {
		unavailable()
	}
	async fn incr_with_expiry(&self, _: &str, _: Duration) -> Result<u64, QueueError> {
		unavailable()
	}
	async fn ttl(&self, _: &str) -> Result<Option<Duration>, QueueError> {
		unavailable()
	}
	async fn push_back(&self, _: &str, _: &[u8]) -> Result<(), QueueError> {
		unavailable()
	}
	async fn pop_front(&self, _: &str) -> Result<Option<Vec<u8>>, QueueError> {
		unavailable()
	}
	async fn list_len(&self, _: &str) -> Result<u64, QueueError> {
		unavailable()
	}
	async fn ping(&self) -> Result<(), QueueError> {
		unavailable()
	}
}

/// In-memory store with switchable failures for marker swaps and result writes.
pub struct FaultyStore {
	inner: MemoryStore,
	pub fail_marker_swaps: AtomicBool,
	pub fail_result_writes: AtomicBool,
}

impl FaultyStore {
	pub fn new(clock: SharedClock) -> Arc<Self> {
		Arc::new(Self {
			inner: MemoryStore::with_clock(clock),
			fail_marker_swaps: AtomicBool::new(false),
			fail_result_writes: AtomicBool::new(false),
		})
	}
}

#[async_trait]
impl KvStore for FaultyStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError> {
		self.inner.get(key).await
	}
	async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), QueueError> {
		if key.contains("result:") && self.fail_result_writes.load(Ordering::SeqCst) {
			return unavailable();
		}
		self.inner.set_ex(key, value, ttl).await
	}
	async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, QueueError> {
		self.inner.set_nx_ex(key, value, ttl).await
	}
	async fn compare_and_swap(&self, key: &str, expected: &[u8], value: &[u8], ttl: Duration) -> Result<bool, QueueError> {
		if key.contains("inflight:") && self.fail_marker_swaps.load(Ordering::SeqCst) {
			return unavailable();
		}
		self.inner.compare_and_swap(key, expected, value, ttl).await
	}
	async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, QueueError> {
		self.inner.delete_if_equals(key, expected).await
	}
	async fn delete(&self, key: &str) -> Result<bool, QueueError> {
		self.inner.delete(key).await
	}
	async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, QueueError> {
		self.inner.incr_with_expiry(key, ttl).await
	}
	async fn ttl(&self, key: &str) -> Result<Option<Duration>, QueueError> {
		self.inner.ttl(key).await
	}
	async fn push_back(&self, list: &str, value: &[u8]) -> Result<(), QueueError> {
		self.inner.push_back(list, value).await
	}
	async fn pop_front(&self, list: &str) -> Result<Option<Vec<u8>>, QueueError> {
		self.inner.pop_front(list).await
	}
	async fn list_len(&self, list: &str) -> Result<u64, QueueError> {
		self.inner.list_len(list).await
	}
	async fn ping(&self) -> Result<(), QueueError> {
		self.inner.ping().await
	}
}
