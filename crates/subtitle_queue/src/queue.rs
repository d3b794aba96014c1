use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::QueueError;
use crate::key::{JobConfig, WorkKey};
use crate::store::{Keyspace, SharedStore};

/// Payload handed from the API side to whichever worker pops it first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
	pub job_id: Uuid,
	pub key: WorkKey,
	pub source_ref: String,
	pub config: JobConfig,
	pub enqueued_at: DateTime<Utc>,
}

/// FIFO list in the shared store.
#[derive(Clone)]
pub struct DispatchQueue {
	store: SharedStore,
	list: String,
}

impl DispatchQueue {
	#[must_use]
	pub fn new(store: SharedStore, keys: &Keyspace) -> Self {
		Self { store, list: keys.dispatch_queue() }
	}

	/// # Errors
	/// Serialization or store failures.
	pub async fn push(&self, job: &QueuedJob) -> Result<(), QueueError> {
		let payload = serde_json::to_vec(job)?;
		self.store.push_back(&self.list, &payload).await
	}

	/// Next decodable job, skipping (and logging) malformed payloads.
	///
	/// # Errors
	/// Store failures.
	pub async fn pop(&self) -> Result<Option<QueuedJob>, QueueError> {
		while let Some(raw) = self.store.pop_front(&self.list).await? {
			match serde_json::from_slice(&raw) {
				Ok(job) => return Ok(Some(job)),
				Err(e) => warn!(error = %e, bytes = raw.len(), "Dropping malformed queue entry"),
			}
		}
		Ok(None)
	}

	/// # Errors
	/// Store failures.
	pub async fn depth(&self) -> Result<u64, QueueError> {
		self.store.list_len(&self.list).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::{KvStore, MemoryStore};
	use std::sync::Arc;

	#[tokio::test]
	async fn test_pop_skips_malformed_entries() {
		let store = Arc::new(MemoryStore::new());
		let keys = Keyspace::default();
		let queue = DispatchQueue::new(store.clone(), &keys);

		store.push_back(&keys.dispatch_queue(), b"not json").await.unwrap();
		let job = QueuedJob {
			job_id: Uuid::new_v4(),
			key: WorkKey::transcription("vid"),
			source_ref: "https://youtu.be/vid".into(),
			config: JobConfig::new("small", None, None),
			enqueued_at: Utc::now(),
		};
		queue.push(&job).await.unwrap();

		assert_eq!(queue.depth().await.unwrap(), 2);
		assert_eq!(queue.pop().await.unwrap(), Some(job));
		assert_eq!(queue.pop().await.unwrap(), None);
	}
}
