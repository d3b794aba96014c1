use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::engines::{Engines, SourceInfo, TranscribeParams, Transcript};
use crate::error::{EngineError, ErrorKind, QueueError};
use crate::key::{JobConfig, WorkKind};
use crate::metrics::{ACTIVE_JOBS, JOB_DURATION};
use crate::queue::{DispatchQueue, QueuedJob};
use crate::result_cache::ResultEntry;
use crate::tracker::{JobOutcome, JobRecord, JobTracker};

#[derive(Debug)]
struct JobFailure {
	kind: ErrorKind,
	message: String,
}

impl JobFailure {
	fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self { kind, message: message.into() }
	}
}

impl From<EngineError> for JobFailure {
	fn from(error: EngineError) -> Self {
		Self::new(ErrorKind::from(&error), error.to_string())
	}
}

impl From<QueueError> for JobFailure {
	fn from(error: QueueError) -> Self {
		Self::new(ErrorKind::InternalFault, error.to_string())
	}
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
	pub concurrency: usize,
	pub poll_interval: Duration,
	pub max_source_duration: Duration,
}

impl From<&crate::config::Config> for PoolSettings {
	fn from(config: &crate::config::Config) -> Self {
		Self {
			concurrency: config.worker_concurrency.max(1),
			poll_interval: config.queue_poll_interval(),
			max_source_duration: config.max_source_duration,
		}
	}
}

/// Pulls queued jobs and runs at most `concurrency` of them at once.
pub struct WorkerPool {
	tracker: JobTracker,
	queue: DispatchQueue,
	engines: Engines,
	clock: SharedClock,
	settings: PoolSettings,
	permits: Arc<Semaphore>,
}

impl WorkerPool {
	#[must_use]
	pub fn new(tracker: JobTracker, queue: DispatchQueue, engines: Engines, clock: SharedClock, settings: PoolSettings) -> Arc<Self> {
		Arc::new(Self {
			tracker,
			queue,
			engines,
			clock,
			permits: Arc::new(Semaphore::new(settings.concurrency)),
			settings,
		})
	}

	/// Consume the dispatch queue until `shutdown` fires, then wait for running jobs.
	///
	/// # Errors
	/// Only if the permit semaphore is closed.
	pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), QueueError> {
		info!(concurrency = self.settings.concurrency, "👷 Worker pool started");

		loop {
			let permit = tokio::select! {
				() = shutdown.cancelled() => break,
				permit = self.permits.clone().acquire_owned() => permit.map_err(|e| QueueError::Internal(e.to_string()))?,
			};

			let job = match self.queue.pop().await {
				Ok(Some(job)) => job,
				Ok(None) => {
					drop(permit);
					if self.idle(&shutdown).await {
						break;
					}
					continue;
				}
				Err(e) => {
					drop(permit);
					warn!(error = %e, "Failed to poll dispatch queue");
					if self.idle(&shutdown).await {
						break;
					}
					continue;
				}
			};

			let pool = Arc::clone(&self);
			tokio::spawn(async move {
				let _permit = permit;
				pool.execute(job).await;
			});
		}

		info!("🛑 Worker pool draining running jobs");
		let total = u32::try_from(self.settings.concurrency)?;
		let _drained = self.permits.acquire_many(total).await.map_err(|e| QueueError::Internal(e.to_string()))?;
		info!("✅ Worker pool stopped");
		Ok(())
	}

	/// Pop and execute one job on the current task. Returns whether a job was found.
	///
	/// # Errors
	/// Store failures while polling the queue.
	pub async fn run_once(&self) -> Result<bool, QueueError> {
		let Some(job) = self.queue.pop().await? else {
			return Ok(false);
		};
		let _permit = self.permits.acquire().await.map_err(|e| QueueError::Internal(e.to_string()))?;
		self.execute(job).await;
		Ok(true)
	}

	// Sleep one poll interval. Returns true when shutdown was requested meanwhile.
	async fn idle(&self, shutdown: &CancellationToken) -> bool {
		tokio::select! {
			() = shutdown.cancelled() => true,
			() = sleep(self.settings.poll_interval) => false,
		}
	}

	async fn execute(&self, job: QueuedJob) {
		let record = match self.tracker.start(&job).await {
			Ok(Some(record)) => record,
			Ok(None) => return,
			Err(e) => {
				error!(key = %job.key, job_id = %job.job_id, error = %e, "Could not start job");
				return;
			}
		};

		info!(key = %record.key, job_id = %record.job_id, "🎬 Processing job");
		ACTIVE_JOBS.inc();
		let started = Instant::now();

		let outcome = match self.produce_with_lease(&record, &job.source_ref).await {
			Ok(entry) => JobOutcome::Done(entry),
			Err(failure) => JobOutcome::Failed {
				kind: failure.kind,
				message: failure.message,
			},
		};

		match self.tracker.finalize(&record, outcome).await {
			Ok(finished) => {
				JOB_DURATION.with_label_values(&[record.key.kind().as_str(), finished.status.as_str()]).observe(started.elapsed().as_secs_f64());
			}
			Err(e) => {
				error!(key = %record.key, job_id = %record.job_id, error = %e, "Could not finalize job");
				let fault = JobOutcome::Failed {
					kind: ErrorKind::InternalFault,
					message: format!("could not finalize: {e}"),
				};
				if let Err(e) = self.tracker.finalize(&record, fault).await {
					warn!(key = %record.key, job_id = %record.job_id, error = %e, "Could not record finalize failure");
					self.tracker.abandon(&record).await;
				}
			}
		}
		ACTIVE_JOBS.dec();
	}

	// Run the job while renewing its lease so no second submission can claim the key.
	async fn produce_with_lease(&self, record: &JobRecord, source_ref: &str) -> Result<ResultEntry, JobFailure> {
		let period = self.tracker.renewal_period();
		let mut heartbeat = interval_at(Instant::now() + period, period);
		heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let produce = self.produce(record, source_ref);
		tokio::pin!(produce);
		loop {
			tokio::select! {
				result = &mut produce => return result,
				_ = heartbeat.tick() => {
					if let Err(e) = self.tracker.renew(record).await {
						warn!(key = %record.key, job_id = %record.job_id, error = %e, "Could not renew job lease");
					}
				}
			}
		}
	}

	async fn produce(&self, record: &JobRecord, source_ref: &str) -> Result<ResultEntry, JobFailure> {
		match record.key.kind() {
			WorkKind::Transcribe => {
				let (transcript, source) = self.transcribe(source_ref, &record.config).await?;
				Ok(ResultEntry::from_transcript(record.key.clone(), record.fingerprint.clone(), transcript, source, self.clock.now()))
			}
			WorkKind::Translate => {
				let target = record.key.variant().ok_or_else(|| JobFailure::new(ErrorKind::InternalFault, "translation key without target language"))?;
				let base = self.transcription_for(record, source_ref).await?;
				let source_lang = record.config.source_language.as_deref().or(base.language.as_deref());

				debug!(key = %record.key, from = source_lang.unwrap_or("auto"), to = target, "Translating transcription");
				let mut translated = self.engines.translator.translate(&base.segments, source_lang, target).await?;
				if translated.language.is_none() {
					translated.language = Some(target.to_string());
				}
				Ok(ResultEntry::from_transcript(record.key.clone(), record.fingerprint.clone(), translated, base.source, self.clock.now()))
			}
		}
	}

	// Reuse the cached transcription of the same subject, producing and caching it when absent.
	async fn transcription_for(&self, record: &JobRecord, source_ref: &str) -> Result<ResultEntry, JobFailure> {
		let key = record.key.transcription_key();
		let config = record.config.for_transcription();
		let fingerprint = config.fingerprint();

		if let Some(entry) = self.tracker.results().get(&key, &fingerprint).await? {
			debug!(key = %key, "Reusing cached transcription");
			return Ok(entry);
		}

		let (transcript, source) = self.transcribe(source_ref, &config).await?;
		let entry = ResultEntry::from_transcript(key.clone(), fingerprint, transcript, source, self.clock.now());
		if let Err(e) = self.tracker.results().put(&key, &entry, self.tracker.result_ttl()).await {
			warn!(key = %key, error = %e, "Could not cache intermediate transcription");
		}
		Ok(entry)
	}

	async fn transcribe(&self, source_ref: &str, config: &JobConfig) -> Result<(Transcript, SourceInfo), JobFailure> {
		let source = self.engines.retriever.probe(source_ref).await?;
		self.check_duration(source.duration_sec)?;

		let audio = self.engines.retriever.fetch_audio(source_ref).await?;
		self.check_duration(audio.duration_sec)?;

		let params = TranscribeParams {
			model: config.asr_model.clone(),
			language: config.source_language.clone(),
		};
		let transcript = self.engines.transcriber.transcribe(&audio, &params).await?;
		let source = SourceInfo {
			duration_sec: source.duration_sec.or(audio.duration_sec),
			..source
		};
		Ok((transcript, source))
	}

	fn check_duration(&self, duration_sec: Option<f64>) -> Result<(), JobFailure> {
		let max = self.settings.max_source_duration.as_secs_f64();
		match duration_sec {
			Some(duration) if duration > max => Err(JobFailure::new(ErrorKind::SourceTooLong, format!("source is {duration:.0}s long, limit is {max:.0}s"))),
			_ => Ok(()),
		}
	}
}
