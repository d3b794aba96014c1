mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;
use subtitle_queue::{CatalogOrigin, ManualClock};
use tokio_util::sync::CancellationToken;

use common::{harness, test_config};

#[tokio::test]
async fn test_three_per_minute_then_denied_until_window_ends() {
	// 1_700_000_000 sits 20s into its minute bucket.
	let clock = ManualClock::at_epoch_secs(1_700_000_000);
	let h = harness(test_config(), clock.clone(), 60.0);

	for _ in 0..3 {
		assert!(h.service.admit("203.0.113.7").await.unwrap().allowed);
	}
	let denied = h.service.admit("203.0.113.7").await.unwrap();
	assert!(!denied.allowed);
	assert_eq!(denied.count, 4);
	assert_eq!(denied.retry_after, Some(Duration::from_secs(40)));

	clock.advance(Duration::from_secs(40));
	let fresh = h.service.admit("203.0.113.7").await.unwrap();
	assert!(fresh.allowed);
	assert_eq!(fresh.count, 1);
}

#[tokio::test]
async fn test_catalog_cold_start_is_populated_once() {
	let clock = ManualClock::at_epoch_secs(1_700_000_000);
	let h = harness(test_config(), clock, 60.0);

	let first = h.service.get_catalog().await.unwrap();
	assert_eq!(first.origin, CatalogOrigin::Source);
	assert!(!first.items.is_empty());

	let second = h.service.get_catalog().await.unwrap();
	assert_eq!(second.origin, CatalogOrigin::Cache);
	assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_background_refresher_populates_snapshot() {
	let h = harness(test_config(), subtitle_queue::clock::system(), 60.0);
	let shutdown = CancellationToken::new();
	let refresher = h.service.catalog().spawn_refresher(shutdown.clone());

	let populated = tokio::time::timeout(Duration::from_secs(5), async {
		while h.catalog.calls.load(Ordering::SeqCst) == 0 {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await;
	assert!(populated.is_ok());

	let view = h.service.get_catalog().await.unwrap();
	assert_eq!(view.origin, CatalogOrigin::Cache);

	shutdown.cancel();
	refresher.await.unwrap();
}
