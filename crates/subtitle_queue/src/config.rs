use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::QueueError;

/// What the rate limiter does when the backing store cannot be reached.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreFailurePolicy {
	/// Deny the request.
	Closed,
	/// Admit the request.
	Open,
	/// Count in a process-local fixed window instead.
	Local,
}

#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(next_help_heading = "Job queue")]
pub struct Config {
	/// Redis URL of the shared store
	#[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
	pub redis_url: String,

	/// Prefix applied to every key written to the store
	#[arg(long, env = "KEY_PREFIX", default_value = "subq:")]
	pub key_prefix: String,

	#[arg(long, env = "STORE_MAX_RETRIES", default_value = "3", help = "Retries for idempotent store commands")]
	pub store_max_retries: u32,

	#[arg(long, env = "STORE_RETRY_DELAY_MS", default_value = "100", help = "Base backoff between store retries")]
	pub store_retry_delay_ms: u64,

	#[arg(
        long = "status-ttl-secs",
        env = "STATUS_TTL_SECS",
        default_value = "3600",
        value_parser = parse_duration,
        help = "Lifetime of job records and in-flight markers"
    )]
	pub status_ttl: Duration,

	/// Result lifetime as a multiple of the status TTL
	#[arg(long, env = "RESULT_TTL_MULTIPLIER", default_value = "2")]
	pub result_ttl_multiplier: u32,

	#[arg(
        long = "rate-limit-window-secs",
        env = "RATE_LIMIT_WINDOW",
        default_value = "3600",
        value_parser = parse_duration,
        help = "Fixed rate-limit window length"
    )]
	pub rate_limit_window: Duration,

	/// Requests admitted per client per window
	#[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value = "50")]
	pub rate_limit_max: u64,

	#[arg(long, env = "RATE_LIMIT_ON_STORE_FAILURE", value_enum, default_value = "closed")]
	pub rate_limit_failure_policy: StoreFailurePolicy,

	#[arg(
        long = "max-source-duration-secs",
        env = "MAX_AUDIO_DURATION",
        default_value = "3600",
        value_parser = parse_duration,
        help = "Longest source accepted for processing"
    )]
	pub max_source_duration: Duration,

	/// Simultaneous external engine invocations per process
	#[arg(long, env = "WORKER_CONCURRENCY", default_value = "2")]
	pub worker_concurrency: usize,

	#[arg(long, env = "QUEUE_POLL_INTERVAL_MS", default_value = "250", help = "Idle delay between dispatch queue polls")]
	pub queue_poll_interval_ms: u64,

	#[arg(
        long = "catalog-refresh-secs",
        env = "CATALOG_REFRESH_SECS",
        default_value = "600",
        value_parser = parse_duration,
        help = "Interval of the background catalog refresh"
    )]
	pub catalog_refresh_interval: Duration,

	#[arg(
        long = "catalog-snapshot-ttl-secs",
        env = "CATALOG_SNAPSHOT_TTL_SECS",
        default_value = "86400",
        value_parser = parse_duration,
        help = "Lifetime of the stored catalog snapshot"
    )]
	pub catalog_snapshot_ttl: Duration,

	/// ASR model requested from the transcription engine
	#[arg(long, env = "ASR_MODEL_SIZE", default_value = "small")]
	pub asr_model: String,

	/// Force the spoken language instead of auto-detection
	#[arg(long, env = "ASR_LANGUAGE")]
	pub asr_language: Option<String>,

	/// Results larger than this many bytes are gzip-compressed
	#[arg(long, env = "RESULT_COMPRESSION_THRESHOLD", default_value = "1024")]
	pub compression_threshold: usize,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			redis_url: "redis://127.0.0.1:6379".to_string(),
			key_prefix: "subq:".to_string(),
			store_max_retries: 3,
			store_retry_delay_ms: 100,
			status_ttl: Duration::from_secs(3600),
			result_ttl_multiplier: 2,
			rate_limit_window: Duration::from_secs(3600),
			rate_limit_max: 50,
			rate_limit_failure_policy: StoreFailurePolicy::Closed,
			max_source_duration: Duration::from_secs(3600),
			worker_concurrency: 2,
			queue_poll_interval_ms: 250,
			catalog_refresh_interval: Duration::from_secs(600),
			catalog_snapshot_ttl: Duration::from_secs(86400),
			asr_model: "small".to_string(),
			asr_language: None,
			compression_threshold: 1024,
		}
	}
}

impl Config {
	#[must_use]
	pub fn new() -> Self {
		Self::parse()
	}

	/// Lifetime of finished results.
	#[must_use]
	pub fn result_ttl(&self) -> Duration {
		self.status_ttl.saturating_mul(self.result_ttl_multiplier)
	}

	#[must_use]
	pub const fn queue_poll_interval(&self) -> Duration {
		Duration::from_millis(self.queue_poll_interval_ms)
	}

	/// Validate configuration values
	///
	/// # Errors
	/// Returns `InvalidConfig` naming the first offending option.
	pub fn validate(&self) -> Result<(), QueueError> {
		if self.status_ttl.is_zero() {
			return Err(QueueError::InvalidConfig("status_ttl must be greater than 0".to_string()));
		}
		if self.result_ttl_multiplier < 1 {
			return Err(QueueError::InvalidConfig("result_ttl_multiplier must be at least 1".to_string()));
		}
		if self.rate_limit_window.as_secs() == 0 {
			return Err(QueueError::InvalidConfig("rate_limit_window must be at least one second".to_string()));
		}
		if self.rate_limit_max == 0 {
			return Err(QueueError::InvalidConfig("rate_limit_max must be greater than 0".to_string()));
		}
		if self.worker_concurrency == 0 {
			return Err(QueueError::InvalidConfig("worker_concurrency must be at least 1".to_string()));
		}
		if self.catalog_refresh_interval.is_zero() {
			return Err(QueueError::InvalidConfig("catalog_refresh_interval must be greater than 0".to_string()));
		}
		if self.catalog_snapshot_ttl < self.catalog_refresh_interval {
			return Err(QueueError::InvalidConfig("catalog_snapshot_ttl must not be shorter than catalog_refresh_interval".to_string()));
		}
		Ok(())
	}
}

fn parse_duration(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_secs)
}
