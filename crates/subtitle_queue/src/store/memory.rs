use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;

use super::KvStore;
use crate::clock::{self, SharedClock};
use crate::error::QueueError;

#[derive(Debug, Clone)]
struct Slot {
	value: Vec<u8>,
	expires_at: Option<DateTime<Utc>>,
}

impl Slot {
	fn is_live(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.map_or(true, |at| at > now)
	}
}

/// In-process store with the same atomicity guarantees as the Redis backend.
///
/// Each primitive runs under the owning shard's lock. Expired keys are purged
/// lazily on access, which keeps the store usable with a manual clock.
pub struct MemoryStore {
	entries: DashMap<String, Slot>,
	lists: DashMap<String, VecDeque<Vec<u8>>>,
	clock: SharedClock,
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> Self {
		Self::with_clock(clock::system())
	}

	#[must_use]
	pub fn with_clock(clock: SharedClock) -> Self {
		Self {
			entries: DashMap::new(),
			lists: DashMap::new(),
			clock,
		}
	}

	fn deadline(&self, ttl: Duration) -> DateTime<Utc> {
		self.clock.now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
	}

	/// Number of live keys, lists excluded.
	#[must_use]
	pub fn len(&self) -> usize {
		let now = self.clock.now();
		self.entries.iter().filter(|slot| slot.is_live(now)).count()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl KvStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError> {
		let now = self.clock.now();
		let expired = match self.entries.get(key) {
			Some(slot) if slot.is_live(now) => return Ok(Some(slot.value.clone())),
			Some(_) => true,
			None => false,
		};
		if expired {
			self.entries.remove_if(key, |_, slot| !slot.is_live(now));
		}
		Ok(None)
	}

	async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), QueueError> {
		let slot = Slot {
			value: value.to_vec(),
			expires_at: Some(self.deadline(ttl)),
		};
		self.entries.insert(key.to_string(), slot);
		Ok(())
	}

	async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, QueueError> {
		let now = self.clock.now();
		let slot = Slot {
			value: value.to_vec(),
			expires_at: Some(self.deadline(ttl)),
		};
		match self.entries.entry(key.to_string()) {
			Entry::Occupied(mut occupied) => {
				if occupied.get().is_live(now) {
					return Ok(false);
				}
				occupied.insert(slot);
				Ok(true)
			}
			Entry::Vacant(vacant) => {
				vacant.insert(slot);
				Ok(true)
			}
		}
	}

	async fn compare_and_swap(&self, key: &str, expected: &[u8], value: &[u8], ttl: Duration) -> Result<bool, QueueError> {
		let now = self.clock.now();
		let deadline = self.deadline(ttl);
		match self.entries.get_mut(key) {
			Some(mut slot) if slot.is_live(now) && slot.value == expected => {
				slot.value = value.to_vec();
				slot.expires_at = Some(deadline);
				Ok(true)
			}
			_ => Ok(false),
		}
	}

	async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, QueueError> {
		let now = self.clock.now();
		Ok(self.entries.remove_if(key, |_, slot| slot.is_live(now) && slot.value == expected).is_some())
	}

	async fn delete(&self, key: &str) -> Result<bool, QueueError> {
		let now = self.clock.now();
		Ok(self.entries.remove(key).is_some_and(|(_, slot)| slot.is_live(now)))
	}

	async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, QueueError> {
		let now = self.clock.now();
		let deadline = self.deadline(ttl);
		let mut slot = self.entries.entry(key.to_string()).or_insert_with(|| Slot {
			value: b"0".to_vec(),
			expires_at: Some(deadline),
		});
		if !slot.is_live(now) {
			slot.value = b"0".to_vec();
			slot.expires_at = Some(deadline);
		}

		let current = std::str::from_utf8(&slot.value)
			.ok()
			.and_then(|text| text.parse::<u64>().ok())
			.ok_or_else(|| QueueError::Store(format!("value at {key} is not an integer")))?;
		let next = current + 1;
		slot.value = next.to_string().into_bytes();
		Ok(next)
	}

	async fn ttl(&self, key: &str) -> Result<Option<Duration>, QueueError> {
		let now = self.clock.now();
		Ok(self.entries.get(key).filter(|slot| slot.is_live(now)).and_then(|slot| slot.expires_at).and_then(|at| (at - now).to_std().ok()))
	}

	async fn push_back(&self, list: &str, value: &[u8]) -> Result<(), QueueError> {
		self.lists.entry(list.to_string()).or_default().push_back(value.to_vec());
		Ok(())
	}

	async fn pop_front(&self, list: &str) -> Result<Option<Vec<u8>>, QueueError> {
		Ok(self.lists.get_mut(list).and_then(|mut items| items.pop_front()))
	}

	async fn list_len(&self, list: &str) -> Result<u64, QueueError> {
		let len = self.lists.get(list).map_or(0, |items| items.len());
		Ok(u64::try_from(len)?)
	}

	async fn ping(&self) -> Result<(), QueueError> {
		Ok(())
	}
}
