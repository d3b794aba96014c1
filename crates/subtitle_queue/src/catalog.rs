use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::engines::{CatalogItem, CatalogSource};
use crate::error::QueueError;
use crate::metrics::CATALOG_REFRESHES;
use crate::store::{Keyspace, SharedStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogOrigin {
	/// Fresh snapshot from the store.
	Cache,
	/// Fetched from the source during this call.
	Source,
	/// Snapshot older than the refresh cadence allows; the source has been failing.
	Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
	pub items: Vec<CatalogItem>,
	pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogView {
	pub items: Vec<CatalogItem>,
	pub origin: CatalogOrigin,
	pub refreshed_at: DateTime<Utc>,
}

impl CatalogView {
	fn from_snapshot(snapshot: CatalogSnapshot, origin: CatalogOrigin) -> Self {
		Self {
			items: snapshot.items,
			origin,
			refreshed_at: snapshot.refreshed_at,
		}
	}
}

/// Cache-aside mirror of the external catalog listing.
pub struct CatalogCache {
	store: SharedStore,
	keys: Keyspace,
	source: Arc<dyn CatalogSource>,
	clock: SharedClock,
	refresh_interval: Duration,
	snapshot_ttl: Duration,
	cold_start: Mutex<()>,
}

impl CatalogCache {
	#[must_use]
	pub fn new(store: SharedStore, keys: Keyspace, source: Arc<dyn CatalogSource>, clock: SharedClock, refresh_interval: Duration, snapshot_ttl: Duration) -> Self {
		Self {
			store,
			keys,
			source,
			clock,
			refresh_interval,
			snapshot_ttl,
			cold_start: Mutex::new(()),
		}
	}

	/// Current catalog, populating it from the source on first use.
	///
	/// # Errors
	/// `SourceUnavailable` when no snapshot exists and the source cannot be reached.
	pub async fn get_catalog(&self) -> Result<CatalogView, QueueError> {
		match self.read_snapshot().await {
			Ok(Some(snapshot)) => return Ok(self.view(snapshot)),
			Ok(None) => {}
			Err(e) => {
				warn!(error = %e, "Catalog snapshot unreadable, querying source directly");
				let snapshot = self.fetch().await?;
				return Ok(CatalogView::from_snapshot(snapshot, CatalogOrigin::Source));
			}
		}

		let _guard = self.cold_start.lock().await;
		if let Some(snapshot) = self.read_snapshot().await? {
			return Ok(self.view(snapshot));
		}
		let snapshot = self.refresh().await?;
		Ok(CatalogView::from_snapshot(snapshot, CatalogOrigin::Source))
	}

	/// Fetch from the source and replace the stored snapshot.
	///
	/// # Errors
	/// `SourceUnavailable` when the source fails. A failed store write is logged, not returned.
	pub async fn refresh(&self) -> Result<CatalogSnapshot, QueueError> {
		let snapshot = match self.fetch().await {
			Ok(snapshot) => snapshot,
			Err(e) => {
				CATALOG_REFRESHES.with_label_values(&["failed"]).inc();
				return Err(e);
			}
		};

		let payload = serde_json::to_vec(&snapshot)?;
		if let Err(e) = self.store.set_ex(&self.keys.catalog(), &payload, self.snapshot_ttl).await {
			warn!(error = %e, "Could not store catalog snapshot");
		}
		CATALOG_REFRESHES.with_label_values(&["ok"]).inc();
		debug!(items = snapshot.items.len(), "Catalog refreshed");
		Ok(snapshot)
	}

	/// Refresh on a fixed interval until `shutdown` fires. The first refresh runs immediately.
	pub fn spawn_refresher(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = interval(self.refresh_interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			info!(interval_secs = self.refresh_interval.as_secs(), "🔄 Catalog refresher started");

			loop {
				tokio::select! {
					() = shutdown.cancelled() => break,
					_ = ticker.tick() => {
						if let Err(e) = self.refresh().await {
							warn!(error = %e, "Catalog refresh failed, keeping previous snapshot");
						}
					}
				}
			}
			info!("Catalog refresher stopped");
		})
	}

	async fn fetch(&self) -> Result<CatalogSnapshot, QueueError> {
		let items = self.source.list_items().await.map_err(|e| QueueError::SourceUnavailable(e.to_string()))?;
		Ok(CatalogSnapshot {
			items,
			refreshed_at: self.clock.now(),
		})
	}

	async fn read_snapshot(&self) -> Result<Option<CatalogSnapshot>, QueueError> {
		let Some(raw) = self.store.get(&self.keys.catalog()).await? else {
			return Ok(None);
		};
		match serde_json::from_slice(&raw) {
			Ok(snapshot) => Ok(Some(snapshot)),
			Err(e) => {
				warn!(error = %e, "Ignoring undecodable catalog snapshot");
				Ok(None)
			}
		}
	}

	// One missed refresh is tolerated before the snapshot counts as stale.
	fn view(&self, snapshot: CatalogSnapshot) -> CatalogView {
		let age = (self.clock.now() - snapshot.refreshed_at).to_std().unwrap_or_default();
		let origin = if age > self.refresh_interval.saturating_mul(2) { CatalogOrigin::Stale } else { CatalogOrigin::Cache };
		CatalogView::from_snapshot(snapshot, origin)
	}
}
