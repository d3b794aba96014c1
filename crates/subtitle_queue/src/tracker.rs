use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::error::{ErrorKind, QueueError};
use crate::key::{Fingerprint, JobConfig, WorkKey};
use crate::metrics::{JOBS_FINISHED, SUBMISSIONS};
use crate::queue::{DispatchQueue, QueuedJob};
use crate::result_cache::{ResultCache, ResultEntry};
use crate::store::{Keyspace, SharedStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Queued,
	Processing,
	Done,
	Error,
}

impl JobStatus {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "queued",
			Self::Processing => "processing",
			Self::Done => "done",
			Self::Error => "error",
		}
	}

	#[must_use]
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Done | Self::Error)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
	pub job_id: Uuid,
	pub key: WorkKey,
	pub status: JobStatus,
	pub requested_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub finished_at: Option<DateTime<Utc>>,
	pub error_kind: Option<ErrorKind>,
	pub error_message: Option<String>,
	pub retry_count: u32,
	pub config: JobConfig,
	pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
	AlreadyDone(ResultEntry),
	/// Another submission holds the key. The record may have expired independently of the marker.
	AlreadyProcessing(Option<JobRecord>),
	NewlyQueued(JobRecord),
}

impl SubmitOutcome {
	#[must_use]
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::AlreadyDone(_) => "already_done",
			Self::AlreadyProcessing(_) => "already_processing",
			Self::NewlyQueued(_) => "newly_queued",
		}
	}
}

#[derive(Debug, Clone)]
pub enum JobOutcome {
	Done(ResultEntry),
	Failed { kind: ErrorKind, message: String },
}

/// Lifecycle of every unit of work, kept entirely in the shared store.
///
/// Single-flight per key is an in-flight marker written with `SET NX` that
/// holds the owning `job_id`. Record transitions are compare-and-swap against
/// the bytes last read, so a superseded worker can never overwrite a newer job.
#[derive(Clone)]
pub struct JobTracker {
	store: SharedStore,
	keys: Keyspace,
	results: ResultCache,
	queue: DispatchQueue,
	clock: SharedClock,
	status_ttl: Duration,
	result_ttl: Duration,
}

impl JobTracker {
	#[must_use]
	pub const fn new(store: SharedStore, keys: Keyspace, results: ResultCache, queue: DispatchQueue, clock: SharedClock, status_ttl: Duration, result_ttl: Duration) -> Self {
		Self {
			store,
			keys,
			results,
			queue,
			clock,
			status_ttl,
			result_ttl,
		}
	}

	#[must_use]
	pub const fn results(&self) -> &ResultCache {
		&self.results
	}

	#[must_use]
	pub const fn result_ttl(&self) -> Duration {
		self.result_ttl
	}

	/// Serve, join, or enqueue work for `key`.
	///
	/// # Errors
	/// `StoreUnavailable` when the store cannot be reached or the job could not be queued.
	pub async fn submit(&self, key: &WorkKey, source_ref: &str, config: &JobConfig) -> Result<SubmitOutcome, QueueError> {
		let outcome = self.submit_inner(key, source_ref, config).await?;
		SUBMISSIONS.with_label_values(&[key.kind().as_str(), outcome.as_str()]).inc();
		Ok(outcome)
	}

	async fn submit_inner(&self, key: &WorkKey, source_ref: &str, config: &JobConfig) -> Result<SubmitOutcome, QueueError> {
		let fingerprint = config.fingerprint();
		if let Some(entry) = self.results.get(key, &fingerprint).await? {
			debug!(key = %key, "Serving cached result");
			return Ok(SubmitOutcome::AlreadyDone(entry));
		}

		let job_id = Uuid::new_v4();
		let marker = self.keys.inflight(&key.storage_key());
		if !self.store.set_nx_ex(&marker, job_id.to_string().as_bytes(), self.status_ttl).await? {
			debug!(key = %key, "Work already in flight");
			return Ok(SubmitOutcome::AlreadyProcessing(self.load(key).await?.map(|(record, _)| record)));
		}

		// A job may have finished between the first lookup and the claim.
		if let Some(entry) = self.results.get(key, &fingerprint).await? {
			self.release_marker(key, job_id).await;
			return Ok(SubmitOutcome::AlreadyDone(entry));
		}

		let retry_count = match self.load(key).await {
			Ok(Some((previous, _))) if previous.status == JobStatus::Error => previous.retry_count + 1,
			Ok(_) => 0,
			Err(e) => {
				self.release_marker(key, job_id).await;
				return Err(e);
			}
		};

		let now = self.clock.now();
		let record = JobRecord {
			job_id,
			key: key.clone(),
			status: JobStatus::Queued,
			requested_at: now,
			started_at: None,
			finished_at: None,
			error_kind: None,
			error_message: None,
			retry_count,
			config: config.clone(),
			fingerprint,
		};

		if let Err(e) = self.write_record(&record).await {
			self.release_marker(key, job_id).await;
			return Err(e);
		}

		let job = QueuedJob {
			job_id,
			key: key.clone(),
			source_ref: source_ref.to_string(),
			config: config.clone(),
			enqueued_at: now,
		};
		if let Err(e) = self.queue.push(&job).await {
			error!(key = %key, job_id = %job_id, error = %e, "Failed to enqueue job");
			let failed = JobRecord {
				status: JobStatus::Error,
				finished_at: Some(now),
				error_kind: Some(ErrorKind::InternalFault),
				error_message: Some(format!("enqueue failed: {e}")),
				..record
			};
			if let Err(write_err) = self.write_record(&failed).await {
				warn!(key = %key, error = %write_err, "Could not record enqueue failure");
			}
			self.release_marker(key, job_id).await;
			return Err(QueueError::StoreUnavailable(e.to_string()));
		}

		info!(key = %key, job_id = %job_id, retry_count, "📥 Job queued");
		Ok(SubmitOutcome::NewlyQueued(record))
	}

	/// # Errors
	/// `NotFound` when no record exists for `key`.
	pub async fn get_status(&self, key: &WorkKey) -> Result<JobRecord, QueueError> {
		self.load(key).await?.map(|(record, _)| record).ok_or_else(|| QueueError::NotFound(key.to_string()))
	}

	/// Whether some submission currently holds the in-flight marker for `key`.
	///
	/// # Errors
	/// Store failures.
	pub async fn is_in_flight(&self, key: &WorkKey) -> Result<bool, QueueError> {
		Ok(self.store.get(&self.keys.inflight(&key.storage_key())).await?.is_some())
	}

	/// Claim a dequeued job for execution.
	///
	/// Returns `None` when the job was superseded, expired, or already claimed.
	///
	/// # Errors
	/// Store failures.
	pub async fn start(&self, job: &QueuedJob) -> Result<Option<JobRecord>, QueueError> {
		let Some((current, raw)) = self.load(&job.key).await? else {
			warn!(key = %job.key, job_id = %job.job_id, "No record for dequeued job, skipping");
			return Ok(None);
		};
		if current.job_id != job.job_id || current.status != JobStatus::Queued {
			warn!(key = %job.key, job_id = %job.job_id, current = %current.job_id, status = current.status.as_str(), "Dequeued job was superseded");
			return Ok(None);
		}

		let started = JobRecord {
			status: JobStatus::Processing,
			started_at: Some(self.clock.now()),
			..current
		};
		if !self.swap_record(&raw, &started).await? {
			return Ok(None);
		}

		// Best effort: the record is already claimed.
		if let Err(e) = self.refresh_marker(&job.key, job.job_id).await {
			warn!(key = %job.key, job_id = %job.job_id, error = %e, "Could not refresh in-flight marker");
		}

		Ok(Some(started))
	}

	/// How often a running job should call [`Self::renew`].
	#[must_use]
	pub fn renewal_period(&self) -> Duration {
		(self.status_ttl / 3).max(Duration::from_millis(100))
	}

	/// Extend the lease of a running job: the in-flight marker and the record TTL.
	///
	/// A lapsed marker is reclaimed when nobody else took it. Returns whether
	/// `job` still owns the key.
	///
	/// # Errors
	/// Store failures.
	pub async fn renew(&self, job: &JobRecord) -> Result<bool, QueueError> {
		let held = match self.load(&job.key).await? {
			Some((current, _)) if current.job_id != job.job_id => false,
			current => {
				if let Some((_, raw)) = current {
					self.store.compare_and_swap(&self.keys.status(&job.key.storage_key()), &raw, &raw, self.status_ttl).await?;
				}
				let marker = self.keys.inflight(&job.key.storage_key());
				self.refresh_marker(&job.key, job.job_id).await? || self.store.set_nx_ex(&marker, job.job_id.to_string().as_bytes(), self.status_ttl).await?
			}
		};

		if held {
			debug!(key = %job.key, job_id = %job.job_id, "Renewed job lease");
		} else {
			warn!(key = %job.key, job_id = %job.job_id, "Job lease taken over by another submission");
		}
		Ok(held)
	}

	/// Record the outcome of a started job and release its in-flight marker.
	///
	/// A `Done` result is persisted before the record flips, so a reader that
	/// sees `done` can always fetch the result. When the result cannot be
	/// stored the job is recorded as an `internal_fault` instead. The marker is
	/// released even when the record write fails, so the key stays resubmittable.
	///
	/// # Errors
	/// Store or serialization failures while writing the record.
	pub async fn finalize(&self, job: &JobRecord, outcome: JobOutcome) -> Result<JobRecord, QueueError> {
		let finished = self.finished_record(job, outcome).await;
		let written = self.write_finished(job, &finished).await;
		self.release_marker(&job.key, job.job_id).await;
		written?;

		let error_kind = finished.error_kind.map_or("", ErrorKind::as_str);
		JOBS_FINISHED.with_label_values(&[finished.status.as_str(), error_kind]).inc();
		match finished.error_kind {
			Some(kind) => warn!(key = %job.key, job_id = %job.job_id, error_kind = kind.as_str(), "❌ Job failed: {}", finished.error_message.as_deref().unwrap_or("")),
			None => info!(key = %job.key, job_id = %job.job_id, "✅ Job done"),
		}
		Ok(finished)
	}

	async fn finished_record(&self, job: &JobRecord, outcome: JobOutcome) -> JobRecord {
		let now = self.clock.now();
		let (kind, message) = match outcome {
			JobOutcome::Done(entry) => match self.results.put(&job.key, &entry, self.result_ttl).await {
				Ok(()) => {
					return JobRecord {
						status: JobStatus::Done,
						finished_at: Some(now),
						error_kind: None,
						error_message: None,
						..job.clone()
					};
				}
				Err(e) => {
					error!(key = %job.key, job_id = %job.job_id, error = %e, "Could not store result");
					(ErrorKind::InternalFault, format!("could not store result: {e}"))
				}
			},
			JobOutcome::Failed { kind, message } => (kind, message),
		};
		JobRecord {
			status: JobStatus::Error,
			finished_at: Some(now),
			error_kind: Some(kind),
			error_message: Some(message),
			..job.clone()
		}
	}

	async fn write_finished(&self, job: &JobRecord, finished: &JobRecord) -> Result<(), QueueError> {
		match self.load(&job.key).await? {
			Some((current, raw)) if current.job_id == job.job_id => {
				if !self.swap_record(&raw, finished).await? {
					warn!(key = %job.key, job_id = %job.job_id, "Record changed during finalize");
				}
			}
			Some((current, _)) => {
				warn!(key = %job.key, job_id = %job.job_id, current = %current.job_id, "Not overwriting record of a newer job");
			}
			None => {
				let payload = serde_json::to_vec(finished)?;
				self.store.set_nx_ex(&self.keys.status(&job.key.storage_key()), &payload, self.status_ttl).await?;
			}
		}
		Ok(())
	}

	async fn load(&self, key: &WorkKey) -> Result<Option<(JobRecord, Vec<u8>)>, QueueError> {
		let Some(raw) = self.store.get(&self.keys.status(&key.storage_key())).await? else {
			return Ok(None);
		};
		let record = serde_json::from_slice(&raw)?;
		Ok(Some((record, raw)))
	}

	async fn write_record(&self, record: &JobRecord) -> Result<(), QueueError> {
		let payload = serde_json::to_vec(record)?;
		self.store.set_ex(&self.keys.status(&record.key.storage_key()), &payload, self.status_ttl).await
	}

	async fn swap_record(&self, expected: &[u8], record: &JobRecord) -> Result<bool, QueueError> {
		let payload = serde_json::to_vec(record)?;
		self.store.compare_and_swap(&self.keys.status(&record.key.storage_key()), expected, &payload, self.status_ttl).await
	}

	async fn refresh_marker(&self, key: &WorkKey, job_id: Uuid) -> Result<bool, QueueError> {
		let owner = job_id.to_string();
		self.store.compare_and_swap(&self.keys.inflight(&key.storage_key()), owner.as_bytes(), owner.as_bytes(), self.status_ttl).await
	}

	/// Drop the in-flight marker of `job` if it still holds it.
	pub async fn abandon(&self, job: &JobRecord) {
		self.release_marker(&job.key, job.job_id).await;
	}

	async fn release_marker(&self, key: &WorkKey, job_id: Uuid) {
		let marker = self.keys.inflight(&key.storage_key());
		if let Err(e) = self.store.delete_if_equals(&marker, job_id.to_string().as_bytes()).await {
			// The marker still expires on its own after the status TTL.
			warn!(key = %key, job_id = %job_id, error = %e, "Failed to release in-flight marker");
		}
	}
}
