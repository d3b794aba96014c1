use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{ttl_millis, KvStore};
use crate::config::Config;
use crate::error::QueueError;

type StoreFuture<T> = Pin<Box<dyn Future<Output = Result<T, QueueError>> + Send>>;

const INCR_WITH_EXPIRY: &str = r"
local value = redis.call('INCR', KEYS[1])
if value == 1 then
	redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return value
";

const COMPARE_AND_SWAP: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
	redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
	return 1
end
return 0
";

const DELETE_IF_EQUALS: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
	return redis.call('DEL', KEYS[1])
end
return 0
";

/// Redis-backed store shared by every API and worker process.
#[derive(Clone)]
pub struct RedisStore {
	conn: ConnectionManager,
	max_retries: u32,
	retry_delay_ms: u64,
	incr_script: Script,
	cas_script: Script,
	cad_script: Script,
}

impl RedisStore {
	/// Open a managed connection to `config.redis_url`.
	///
	/// # Errors
	/// Fails when the URL is invalid or the server cannot be reached.
	pub async fn connect(config: &Config) -> Result<Self, QueueError> {
		let client = Client::open(config.redis_url.as_str())?;
		let conn = ConnectionManager::new(client).await?;
		debug!("Connected to redis at {}", config.redis_url);

		Ok(Self {
			conn,
			max_retries: config.store_max_retries,
			retry_delay_ms: config.store_retry_delay_ms,
			incr_script: Script::new(INCR_WITH_EXPIRY),
			cas_script: Script::new(COMPARE_AND_SWAP),
			cad_script: Script::new(DELETE_IF_EQUALS),
		})
	}

	// Only idempotent commands go through here; a retried INCR or LPOP could double-apply.
	async fn with_retry<F, T>(&self, mut operation: F) -> Result<T, QueueError>
	where
		F: FnMut() -> StoreFuture<T>,
	{
		let mut attempt = 0;
		loop {
			match operation().await {
				Ok(result) => return Ok(result),
				Err(e) if e.is_unavailable() && attempt < self.max_retries => {
					attempt += 1;
					warn!("Store operation failed (attempt {}), retrying: {}", attempt, e);
					sleep(Duration::from_millis(self.retry_delay_ms * u64::from(attempt))).await;
				}
				Err(e) => return Err(e),
			}
		}
	}
}

#[async_trait]
impl KvStore for RedisStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError> {
		self
			.with_retry(|| {
				let mut conn = self.conn.clone();
				let key = key.to_string();
				Box::pin(async move { Ok(redis::cmd("GET").arg(&key).query_async::<Option<Vec<u8>>>(&mut conn).await?) })
			})
			.await
	}

	async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), QueueError> {
		let millis = ttl_millis(ttl)?;
		self
			.with_retry(|| {
				let mut conn = self.conn.clone();
				let key = key.to_string();
				let value = value.to_vec();
				Box::pin(async move {
					redis::cmd("SET").arg(&key).arg(value).arg("PX").arg(millis).query_async::<()>(&mut conn).await?;
					Ok(())
				})
			})
			.await
	}

	async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, QueueError> {
		let mut conn = self.conn.clone();
		let reply: Option<String> = redis::cmd("SET").arg(key).arg(value).arg("NX").arg("PX").arg(ttl_millis(ttl)?).query_async(&mut conn).await?;
		Ok(reply.is_some())
	}

	async fn compare_and_swap(&self, key: &str, expected: &[u8], value: &[u8], ttl: Duration) -> Result<bool, QueueError> {
		let mut conn = self.conn.clone();
		let swapped: i64 = self.cas_script.key(key).arg(expected).arg(value).arg(ttl_millis(ttl)?).invoke_async(&mut conn).await?;
		Ok(swapped == 1)
	}

	async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, QueueError> {
		let mut conn = self.conn.clone();
		let deleted: i64 = self.cad_script.key(key).arg(expected).invoke_async(&mut conn).await?;
		Ok(deleted == 1)
	}

	async fn delete(&self, key: &str) -> Result<bool, QueueError> {
		let deleted: i64 = self
			.with_retry(|| {
				let mut conn = self.conn.clone();
				let key = key.to_string();
				Box::pin(async move { Ok(redis::cmd("DEL").arg(&key).query_async::<i64>(&mut conn).await?) })
			})
			.await?;
		Ok(deleted > 0)
	}

	async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, QueueError> {
		let mut conn = self.conn.clone();
		let value: u64 = self.incr_script.key(key).arg(ttl_millis(ttl)?).invoke_async(&mut conn).await?;
		Ok(value)
	}

	async fn ttl(&self, key: &str) -> Result<Option<Duration>, QueueError> {
		let millis: i64 = self
			.with_retry(|| {
				let mut conn = self.conn.clone();
				let key = key.to_string();
				Box::pin(async move { Ok(redis::cmd("PTTL").arg(&key).query_async::<i64>(&mut conn).await?) })
			})
			.await?;
		// -2 missing, -1 persistent
		Ok(u64::try_from(millis).ok().map(Duration::from_millis))
	}

	async fn push_back(&self, list: &str, value: &[u8]) -> Result<(), QueueError> {
		let mut conn = self.conn.clone();
		redis::cmd("RPUSH").arg(list).arg(value).query_async::<i64>(&mut conn).await?;
		Ok(())
	}

	async fn pop_front(&self, list: &str) -> Result<Option<Vec<u8>>, QueueError> {
		let mut conn = self.conn.clone();
		Ok(redis::cmd("LPOP").arg(list).query_async::<Option<Vec<u8>>>(&mut conn).await?)
	}

	async fn list_len(&self, list: &str) -> Result<u64, QueueError> {
		self
			.with_retry(|| {
				let mut conn = self.conn.clone();
				let list = list.to_string();
				Box::pin(async move { Ok(redis::cmd("LLEN").arg(&list).query_async::<u64>(&mut conn).await?) })
			})
			.await
	}

	async fn ping(&self) -> Result<(), QueueError> {
		let mut conn = self.conn.clone();
		redis::cmd("PING").query_async::<String>(&mut conn).await?;
		Ok(())
	}
}
