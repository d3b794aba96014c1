use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::TryFromIntError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
	#[error("rate limit exceeded, retry after {retry_after:?}")]
	AdmissionDenied { retry_after: Option<Duration> },

	#[error("no job or cached result for {0}")]
	NotFound(String),

	#[error("backing store unavailable: {0}")]
	StoreUnavailable(String),

	#[error("backing store error: {0}")]
	Store(String),

	#[error("catalog source unavailable: {0}")]
	SourceUnavailable(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("internal error: {0}")]
	Internal(String),
}

impl QueueError {
	/// Whether the failure means the store could not be reached at all.
	#[must_use]
	pub const fn is_unavailable(&self) -> bool {
		matches!(self, Self::StoreUnavailable(_))
	}
}

impl From<redis::RedisError> for QueueError {
	fn from(error: redis::RedisError) -> Self {
		if error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal() || error.is_timeout() {
			Self::StoreUnavailable(error.to_string())
		} else {
			Self::Store(error.to_string())
		}
	}
}

impl From<TryFromIntError> for QueueError {
	fn from(error: TryFromIntError) -> Self {
		Self::Internal(format!("conversion error: {error}"))
	}
}

impl From<std::io::Error> for QueueError {
	fn from(error: std::io::Error) -> Self {
		Self::Internal(format!("io error: {error}"))
	}
}

/// Failures reported by the external collaborators.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
	#[error("retrieval failed: {0}")]
	Retrieval(String),

	#[error("engine failed: {0}")]
	Engine(String),

	#[error("source unavailable: {0}")]
	SourceUnavailable(String),

	#[error("internal fault: {0}")]
	Internal(String),
}

/// Classification recorded on a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	SourceTooLong,
	RetrievalFailed,
	EngineFailed,
	InternalFault,
}

impl ErrorKind {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::SourceTooLong => "source_too_long",
			Self::RetrievalFailed => "retrieval_failed",
			Self::EngineFailed => "engine_failed",
			Self::InternalFault => "internal_fault",
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl From<&EngineError> for ErrorKind {
	fn from(error: &EngineError) -> Self {
		match error {
			EngineError::Retrieval(_) | EngineError::SourceUnavailable(_) => Self::RetrievalFailed,
			EngineError::Engine(_) => Self::EngineFailed,
			EngineError::Internal(_) => Self::InternalFault,
		}
	}
}
