use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::config::{Config, StoreFailurePolicy};
use crate::error::QueueError;
use crate::metrics::ADMISSIONS;
use crate::store::{Keyspace, KvStore, MemoryStore, SharedStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Admission {
	pub allowed: bool,
	/// Time until the current window closes, set when denied.
	pub retry_after: Option<Duration>,
	/// Requests counted in the current window, this one included.
	pub count: u64,
}

/// Per-client fixed-window admission control.
///
/// A client may burst up to twice the limit across a window boundary.
#[derive(Clone)]
pub struct RateLimiter {
	store: SharedStore,
	fallback: Arc<MemoryStore>,
	keys: Keyspace,
	clock: SharedClock,
	window: Duration,
	max_requests: u64,
	policy: StoreFailurePolicy,
}

impl RateLimiter {
	#[must_use]
	pub fn new(store: SharedStore, keys: Keyspace, clock: SharedClock, config: &Config) -> Self {
		Self {
			store,
			fallback: Arc::new(MemoryStore::with_clock(clock.clone())),
			keys,
			clock,
			window: config.rate_limit_window,
			max_requests: config.rate_limit_max,
			policy: config.rate_limit_failure_policy,
		}
	}

	/// Count one request from `client_id` and decide whether to admit it.
	///
	/// # Errors
	/// Only non-connectivity store errors; unreachable stores are handled by the configured policy.
	pub async fn admit(&self, client_id: &str) -> Result<Admission, QueueError> {
		let window_secs = self.window.as_secs().max(1);
		let now = self.clock.unix_secs();
		let bucket = now / window_secs;
		let retry_after = Duration::from_secs((bucket + 1) * window_secs - now);
		let key = self.keys.rate_limit(client_id, bucket);

		let count = match self.store.incr_with_expiry(&key, self.window).await {
			Ok(count) => count,
			Err(e) if e.is_unavailable() => match self.policy {
				StoreFailurePolicy::Closed => {
					warn!(client = client_id, error = %e, "Store unreachable, denying request");
					ADMISSIONS.with_label_values(&["denied_store_down"]).inc();
					return Ok(Admission {
						allowed: false,
						retry_after: Some(retry_after),
						count: 0,
					});
				}
				StoreFailurePolicy::Open => {
					warn!(client = client_id, error = %e, "Store unreachable, admitting request");
					ADMISSIONS.with_label_values(&["allowed_store_down"]).inc();
					return Ok(Admission {
						allowed: true,
						retry_after: None,
						count: 0,
					});
				}
				StoreFailurePolicy::Local => {
					warn!(client = client_id, error = %e, "Store unreachable, counting locally");
					self.fallback.incr_with_expiry(&key, self.window).await?
				}
			},
			Err(e) => return Err(e),
		};

		let allowed = count - 1 < self.max_requests;
		debug!(client = client_id, count, limit = self.max_requests, allowed, "Admission decision");
		ADMISSIONS.with_label_values(&[if allowed { "allowed" } else { "denied" }]).inc();

		Ok(Admission {
			allowed,
			retry_after: (!allowed).then_some(retry_after),
			count,
		})
	}
}
