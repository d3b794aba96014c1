mod common;

use async_trait::async_trait;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use subtitle_queue::{
	AudioPayload, Config, EngineError, Engines, ErrorKind, JobStatus, ManualClock, MemoryStore, QueueError, SharedClock, SubmitOutcome, SubtitleService, TranscribeParams, Transcriber, Transcript,
};
use tokio::sync::Notify;

use common::{harness_with_store, test_config, DownStore, FakeRetriever, FakeTranslator, FaultyStore, StaticCatalog};

const VIDEO: &str = "dQw4w9WgXcQ";
const URL: &str = "https://youtu.be/dQw4w9WgXcQ";

#[tokio::test]
async fn test_unreachable_store_is_never_a_miss() {
	let clock: SharedClock = ManualClock::at_epoch_secs(1_700_000_000);
	let service = SubtitleService::new(test_config(), Arc::new(DownStore), clock, Arc::new(StaticCatalog::default())).unwrap();

	assert!(matches!(service.submit_work(VIDEO, URL, None).await, Err(QueueError::StoreUnavailable(_))));
	assert!(matches!(service.submit_work(VIDEO, URL, Some("ru")).await, Err(QueueError::StoreUnavailable(_))));
	assert!(matches!(service.get_status(VIDEO, None).await, Err(QueueError::StoreUnavailable(_))));
	assert!(matches!(service.get_result(VIDEO, None).await, Err(QueueError::StoreUnavailable(_))));
	assert!(service.health().await.is_err());
}

#[tokio::test]
async fn test_failed_marker_refresh_does_not_strand_job() {
	let clock = ManualClock::at_epoch_secs(1_700_000_000);
	let store = FaultyStore::new(clock.clone());
	store.fail_marker_swaps.store(true, Ordering::SeqCst);
	let h = harness_with_store(test_config(), clock, store.clone(), 212.0);

	assert!(matches!(h.service.submit_work(VIDEO, URL, None).await.unwrap(), SubmitOutcome::NewlyQueued(_)));
	assert!(h.pool.run_once().await.unwrap());

	assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
	assert_eq!(h.service.get_status(VIDEO, None).await.unwrap().status, JobStatus::Done);
	assert!(matches!(h.service.submit_work(VIDEO, URL, None).await.unwrap(), SubmitOutcome::AlreadyDone(_)));
}

#[tokio::test]
async fn test_failed_result_write_leaves_key_resubmittable() {
	let clock = ManualClock::at_epoch_secs(1_700_000_000);
	let store = FaultyStore::new(clock.clone());
	store.fail_result_writes.store(true, Ordering::SeqCst);
	let h = harness_with_store(test_config(), clock, store.clone(), 212.0);

	h.service.submit_work(VIDEO, URL, None).await.unwrap();
	assert!(h.pool.run_once().await.unwrap());

	let failed = h.service.get_status(VIDEO, None).await.unwrap();
	assert_eq!(failed.status, JobStatus::Error);
	assert_eq!(failed.error_kind, Some(ErrorKind::InternalFault));

	store.fail_result_writes.store(false, Ordering::SeqCst);
	let SubmitOutcome::NewlyQueued(retry) = h.service.submit_work(VIDEO, URL, None).await.unwrap() else {
		panic!("the marker should have been released");
	};
	assert_eq!(retry.retry_count, 1);
	h.pool.run_once().await.unwrap();
	assert_eq!(h.service.get_result(VIDEO, None).await.unwrap().text, "hello world");
}

#[tokio::test]
async fn test_status_ignores_results_of_other_parameters() {
	let clock = ManualClock::at_epoch_secs(1_700_000_000);
	let store = Arc::new(MemoryStore::with_clock(clock.clone()));
	let small = harness_with_store(test_config(), clock.clone(), store.clone(), 212.0);
	let medium = harness_with_store(
		Config {
			asr_model: "medium".to_string(),
			..test_config()
		},
		clock,
		store,
		212.0,
	);

	small.service.submit_work(VIDEO, URL, None).await.unwrap();
	small.pool.run_once().await.unwrap();
	assert_eq!(small.service.get_status(VIDEO, None).await.unwrap().status, JobStatus::Done);

	assert!(matches!(medium.service.get_status(VIDEO, None).await, Err(QueueError::NotFound(_))));
	assert!(matches!(medium.service.get_result(VIDEO, None).await, Err(QueueError::NotFound(_))));

	assert!(matches!(medium.service.submit_work(VIDEO, URL, None).await.unwrap(), SubmitOutcome::NewlyQueued(_)));
	assert_eq!(medium.service.get_status(VIDEO, None).await.unwrap().status, JobStatus::Queued);
}

struct GatedTranscriber {
	gate: Arc<Notify>,
}

#[async_trait]
impl Transcriber for GatedTranscriber {
	async fn transcribe(&self, _audio: &AudioPayload, _params: &TranscribeParams) -> Result<Transcript, EngineError> {
		self.gate.notified().await;
		Ok(Transcript::default())
	}
}

#[tokio::test(start_paused = true)]
async fn test_long_job_keeps_its_lease() {
	let clock = ManualClock::at_epoch_secs(1_700_000_000);
	let store = Arc::new(MemoryStore::with_clock(clock.clone()));
	let service = SubtitleService::new(test_config(), store, clock.clone(), Arc::new(StaticCatalog::default())).unwrap();
	let gate = Arc::new(Notify::new());
	let pool = service.worker_pool(Engines {
		retriever: FakeRetriever::with_duration(212.0),
		transcriber: Arc::new(GatedTranscriber { gate: gate.clone() }),
		translator: Arc::new(FakeTranslator::default()),
	});

	service.submit_work(VIDEO, URL, None).await.unwrap();
	let worker = tokio::spawn({
		let pool = Arc::clone(&pool);
		async move { pool.run_once().await }
	});
	while service.get_status(VIDEO, None).await.unwrap().status != JobStatus::Processing {
		tokio::task::yield_now().await;
	}

	// status_ttl is 60s; the job runs for 100s.
	for _ in 0..5 {
		clock.advance(Duration::from_secs(20));
		tokio::time::advance(Duration::from_secs(20)).await;
		for _ in 0..10 {
			tokio::task::yield_now().await;
		}
	}

	assert!(matches!(service.submit_work(VIDEO, URL, None).await.unwrap(), SubmitOutcome::AlreadyProcessing(Some(_))));
	assert_eq!(service.get_status(VIDEO, None).await.unwrap().status, JobStatus::Processing);

	gate.notify_one();
	assert!(worker.await.unwrap().unwrap());
	assert_eq!(service.get_status(VIDEO, None).await.unwrap().status, JobStatus::Done);
}
