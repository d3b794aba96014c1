//! Shared key-value store the whole core coordinates through.
//!
//! Every mutation that more than one process may race on goes through one of
//! the atomic primitives below; callers never read-modify-write.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::QueueError;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[async_trait]
pub trait KvStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError>;

	async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), QueueError>;

	/// Write only if the key is absent. Returns whether the write happened.
	async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, QueueError>;

	/// Replace the value only if it still equals `expected`.
	async fn compare_and_swap(&self, key: &str, expected: &[u8], value: &[u8], ttl: Duration) -> Result<bool, QueueError>;

	/// Delete the key only if it still holds `expected`.
	async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, QueueError>;

	async fn delete(&self, key: &str) -> Result<bool, QueueError>;

	/// Increment a counter, attaching `ttl` when this call created it. Returns the new value.
	async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, QueueError>;

	/// Remaining lifetime; `None` when the key is missing or never expires.
	async fn ttl(&self, key: &str) -> Result<Option<Duration>, QueueError>;

	async fn push_back(&self, list: &str, value: &[u8]) -> Result<(), QueueError>;

	async fn pop_front(&self, list: &str) -> Result<Option<Vec<u8>>, QueueError>;

	async fn list_len(&self, list: &str) -> Result<u64, QueueError>;

	async fn ping(&self) -> Result<(), QueueError>;
}

pub type SharedStore = Arc<dyn KvStore>;

/// Builds prefixed store keys for every entity the core owns.
#[derive(Debug, Clone)]
pub struct Keyspace {
	prefix: String,
}

impl Keyspace {
	#[must_use]
	pub fn new(prefix: impl Into<String>) -> Self {
		Self { prefix: prefix.into() }
	}

	#[must_use]
	pub fn status(&self, key: &str) -> String {
		format!("{}status:{key}", self.prefix)
	}

	#[must_use]
	pub fn inflight(&self, key: &str) -> String {
		format!("{}inflight:{key}", self.prefix)
	}

	#[must_use]
	pub fn result(&self, key: &str) -> String {
		format!("{}result:{key}", self.prefix)
	}

	#[must_use]
	pub fn rate_limit(&self, client_id: &str, bucket: u64) -> String {
		format!("{}ratelimit:{client_id}:{bucket}", self.prefix)
	}

	#[must_use]
	pub fn catalog(&self) -> String {
		format!("{}catalog:snapshot", self.prefix)
	}

	#[must_use]
	pub fn dispatch_queue(&self) -> String {
		format!("{}queue:jobs", self.prefix)
	}
}

impl Default for Keyspace {
	fn default() -> Self {
		Self::new("subq:")
	}
}

/// Millisecond TTL argument for store commands, never zero.
pub(crate) fn ttl_millis(ttl: Duration) -> Result<u64, QueueError> {
	Ok(u64::try_from(ttl.as_millis())?.max(1))
}
