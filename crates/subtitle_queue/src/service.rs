use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::{CatalogCache, CatalogView};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::engines::{CatalogSource, Engines};
use crate::error::{ErrorKind, QueueError};
use crate::key::{JobConfig, WorkKey};
use crate::pool::{PoolSettings, WorkerPool};
use crate::queue::DispatchQueue;
use crate::rate_limit::{Admission, RateLimiter};
use crate::result_cache::{ResultCache, ResultEntry};
use crate::store::{Keyspace, SharedStore};
use crate::tracker::{JobRecord, JobStatus, JobTracker, SubmitOutcome};

/// What a status poll reports for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
	pub key: String,
	pub status: JobStatus,
	pub job_id: Option<Uuid>,
	pub requested_at: Option<DateTime<Utc>>,
	pub started_at: Option<DateTime<Utc>>,
	pub finished_at: Option<DateTime<Utc>>,
	pub error_kind: Option<ErrorKind>,
	pub error_message: Option<String>,
	pub retry_count: u32,
}

impl From<&JobRecord> for StatusView {
	fn from(record: &JobRecord) -> Self {
		Self {
			key: record.key.storage_key(),
			status: record.status,
			job_id: Some(record.job_id),
			requested_at: Some(record.requested_at),
			started_at: record.started_at,
			finished_at: record.finished_at,
			error_kind: record.error_kind,
			error_message: record.error_message.clone(),
			retry_count: record.retry_count,
		}
	}
}

impl StatusView {
	fn bare(key: &WorkKey, status: JobStatus, finished_at: Option<DateTime<Utc>>) -> Self {
		Self {
			key: key.storage_key(),
			status,
			job_id: None,
			requested_at: None,
			started_at: None,
			finished_at,
			error_kind: None,
			error_message: None,
			retry_count: 0,
		}
	}
}

/// Entry point for the request layer: admission, submission, polling and the catalog.
#[derive(Clone)]
pub struct SubtitleService {
	config: Arc<Config>,
	store: SharedStore,
	keys: Keyspace,
	clock: SharedClock,
	limiter: RateLimiter,
	tracker: JobTracker,
	queue: DispatchQueue,
	catalog: Arc<CatalogCache>,
}

impl SubtitleService {
	/// Wire every component over `store`.
	///
	/// # Errors
	/// `InvalidConfig` when `config` does not validate.
	pub fn new(config: Config, store: SharedStore, clock: SharedClock, catalog_source: Arc<dyn CatalogSource>) -> Result<Self, QueueError> {
		config.validate()?;

		let keys = Keyspace::new(config.key_prefix.clone());
		let results = ResultCache::new(store.clone(), keys.clone(), config.compression_threshold);
		let queue = DispatchQueue::new(store.clone(), &keys);
		let tracker = JobTracker::new(store.clone(), keys.clone(), results, queue.clone(), clock.clone(), config.status_ttl, config.result_ttl());
		let limiter = RateLimiter::new(store.clone(), keys.clone(), clock.clone(), &config);
		let catalog = Arc::new(CatalogCache::new(
			store.clone(),
			keys.clone(),
			catalog_source,
			clock.clone(),
			config.catalog_refresh_interval,
			config.catalog_snapshot_ttl,
		));

		Ok(Self {
			config: Arc::new(config),
			store,
			keys,
			clock,
			limiter,
			tracker,
			queue,
			catalog,
		})
	}

	#[must_use]
	pub fn config(&self) -> &Config {
		&self.config
	}

	#[must_use]
	pub const fn keyspace(&self) -> &Keyspace {
		&self.keys
	}

	#[must_use]
	pub fn catalog(&self) -> Arc<CatalogCache> {
		Arc::clone(&self.catalog)
	}

	/// Worker pool sharing this service's store and tracker.
	#[must_use]
	pub fn worker_pool(&self, engines: Engines) -> Arc<WorkerPool> {
		WorkerPool::new(self.tracker.clone(), self.queue.clone(), engines, self.clock.clone(), PoolSettings::from(self.config.as_ref()))
	}

	/// Engine parameters for a request, from the configured model and language.
	#[must_use]
	pub fn job_config(&self, target_language: Option<&str>) -> JobConfig {
		let target = target_language.map(str::trim).filter(|lang| !lang.is_empty()).map(str::to_string);
		JobConfig::new(self.config.asr_model.clone(), self.config.asr_language.clone(), target)
	}

	/// # Errors
	/// Store errors the failure policy does not cover.
	pub async fn admit(&self, client_id: &str) -> Result<Admission, QueueError> {
		self.limiter.admit(client_id).await
	}

	/// # Errors
	/// `StoreUnavailable` when the store is down or the job could not be queued.
	pub async fn submit_work(&self, subject_id: &str, source_ref: &str, target_language: Option<&str>) -> Result<SubmitOutcome, QueueError> {
		let key = WorkKey::for_request(subject_id, target_language);
		self.tracker.submit(&key, source_ref, &self.job_config(target_language)).await
	}

	/// Polling view: the result cache first, then the job record, then the in-flight marker.
	///
	/// Records computed under different engine parameters only count while
	/// they are still queued or processing.
	///
	/// # Errors
	/// `NotFound` when nothing is known about the key under the current parameters.
	pub async fn get_status(&self, subject_id: &str, target_language: Option<&str>) -> Result<StatusView, QueueError> {
		let key = WorkKey::for_request(subject_id, target_language);
		let fingerprint = self.job_config(target_language).fingerprint();

		let cached = self.tracker.results().get(&key, &fingerprint).await?;
		let record = match self.tracker.get_status(&key).await {
			Ok(record) => Some(record),
			Err(QueueError::NotFound(_)) => None,
			Err(e) => return Err(e),
		};

		if let Some(entry) = cached {
			return Ok(match record {
				Some(record) if record.status == JobStatus::Done && record.fingerprint == fingerprint => StatusView::from(&record),
				_ => StatusView::bare(&key, JobStatus::Done, Some(entry.created_at)),
			});
		}

		if let Some(record) = record {
			let current = record.fingerprint == fingerprint;
			match record.status {
				JobStatus::Queued | JobStatus::Processing => return Ok(StatusView::from(&record)),
				JobStatus::Error if current => return Ok(StatusView::from(&record)),
				JobStatus::Error | JobStatus::Done => debug!(key = %key, stored = %record.fingerprint, "Ignoring record without a usable result"),
			}
		}

		if self.tracker.is_in_flight(&key).await? {
			return Ok(StatusView::bare(&key, JobStatus::Processing, None));
		}
		Err(QueueError::NotFound(key.storage_key()))
	}

	/// Finished result computed with the current engine parameters.
	///
	/// # Errors
	/// `NotFound` when no matching result is stored.
	pub async fn get_result(&self, subject_id: &str, target_language: Option<&str>) -> Result<ResultEntry, QueueError> {
		let key = WorkKey::for_request(subject_id, target_language);
		let fingerprint = self.job_config(target_language).fingerprint();
		self.tracker.results().get(&key, &fingerprint).await?.ok_or_else(|| QueueError::NotFound(key.storage_key()))
	}

	/// # Errors
	/// `SourceUnavailable` on a cold start with the source down.
	pub async fn get_catalog(&self) -> Result<CatalogView, QueueError> {
		self.catalog.get_catalog().await
	}

	/// # Errors
	/// The store ping failure.
	pub async fn health(&self) -> Result<u64, QueueError> {
		self.store.ping().await?;
		self.queue.depth().await
	}
}
