use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

use crate::engines::{Segment, SourceInfo, Transcript};
use crate::error::QueueError;
use crate::key::{Fingerprint, WorkKey};
use crate::store::{Keyspace, SharedStore};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A finished artifact. Written once, when its job reaches `done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
	pub key: WorkKey,
	pub fingerprint: Fingerprint,
	pub text: String,
	pub language: Option<String>,
	pub segments: Vec<Segment>,
	#[serde(default)]
	pub meta: HashMap<String, serde_json::Value>,
	#[serde(default)]
	pub source: SourceInfo,
	pub created_at: DateTime<Utc>,
}

impl ResultEntry {
	#[must_use]
	pub fn from_transcript(key: WorkKey, fingerprint: Fingerprint, transcript: Transcript, source: SourceInfo, created_at: DateTime<Utc>) -> Self {
		Self {
			key,
			fingerprint,
			text: transcript.text,
			language: transcript.language,
			segments: transcript.segments,
			meta: transcript.meta,
			source,
			created_at,
		}
	}
}

/// Finished results, stored apart from job status with their own lifetime.
#[derive(Clone)]
pub struct ResultCache {
	store: SharedStore,
	keys: Keyspace,
	compression_threshold: usize,
}

impl ResultCache {
	#[must_use]
	pub const fn new(store: SharedStore, keys: Keyspace, compression_threshold: usize) -> Self {
		Self { store, keys, compression_threshold }
	}

	/// Look up the result for `key` computed under `fingerprint`.
	///
	/// An entry computed with different parameters is reported as absent.
	///
	/// # Errors
	/// Store failures propagate; they are never turned into a miss.
	pub async fn get(&self, key: &WorkKey, fingerprint: &Fingerprint) -> Result<Option<ResultEntry>, QueueError> {
		let Some(entry) = self.get_any(key).await? else {
			return Ok(None);
		};
		if &entry.fingerprint != fingerprint {
			debug!(key = %key, stored = %entry.fingerprint, requested = %fingerprint, "Result fingerprint mismatch");
			return Ok(None);
		}
		Ok(Some(entry))
	}

	/// Look up the result for `key` regardless of its parameters.
	///
	/// # Errors
	/// Store failures and undecodable payloads.
	pub async fn get_any(&self, key: &WorkKey) -> Result<Option<ResultEntry>, QueueError> {
		let Some(raw) = self.store.get(&self.keys.result(&key.storage_key())).await? else {
			return Ok(None);
		};
		let decoded = decompress(&raw)?;
		match serde_json::from_slice(&decoded) {
			Ok(entry) => Ok(Some(entry)),
			Err(e) => {
				warn!(key = %key, error = %e, "Discarding undecodable result entry");
				Ok(None)
			}
		}
	}

	/// # Errors
	/// Serialization or store failures.
	pub async fn put(&self, key: &WorkKey, entry: &ResultEntry, ttl: Duration) -> Result<(), QueueError> {
		let serialized = serde_json::to_vec(entry)?;
		let payload = self.compress(&serialized)?;
		self.store.set_ex(&self.keys.result(&key.storage_key()), &payload, ttl).await?;
		debug!(key = %key, bytes = payload.len(), ttl_secs = ttl.as_secs(), "Stored result");
		Ok(())
	}

	/// # Errors
	/// Store failures.
	pub async fn remove(&self, key: &WorkKey) -> Result<bool, QueueError> {
		self.store.delete(&self.keys.result(&key.storage_key())).await
	}

	fn compress(&self, data: &[u8]) -> Result<Vec<u8>, QueueError> {
		if data.len() < self.compression_threshold {
			return Ok(data.to_vec());
		}
		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(data)?;
		Ok(encoder.finish()?)
	}
}

// JSON never starts with the gzip magic, so the header alone tells the two apart.
fn decompress(data: &[u8]) -> Result<Vec<u8>, QueueError> {
	if !data.starts_with(&GZIP_MAGIC) {
		return Ok(data.to_vec());
	}
	let mut decoder = GzDecoder::new(data);
	let mut decompressed = Vec::new();
	decoder.read_to_end(&mut decompressed)?;
	Ok(decompressed)
}
