use async_trait::async_trait;
use serde::Deserialize;
use subtitle_queue::{CatalogItem, CatalogSource, EngineError};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
	Bare(Vec<CatalogItem>),
	Wrapped { videos: Vec<CatalogItem> },
}

impl From<Listing> for Vec<CatalogItem> {
	fn from(listing: Listing) -> Self {
		match listing {
			Listing::Bare(items) | Listing::Wrapped { videos: items } => items,
		}
	}
}

/// Catalog read from a JSON endpoint returning either a list or `{"videos": [...]}`.
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
	client: reqwest::Client,
	url: String,
}

impl HttpCatalogSource {
	#[must_use]
	pub const fn new(client: reqwest::Client, url: String) -> Self {
		Self { client, url }
	}
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
	async fn list_items(&self) -> Result<Vec<CatalogItem>, EngineError> {
		let response = self
			.client
			.get(&self.url)
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(|e| EngineError::SourceUnavailable(format!("catalog request failed: {e}")))?;
		let listing: Listing = response.json().await.map_err(|e| EngineError::SourceUnavailable(format!("unreadable catalog: {e}")))?;
		Ok(listing.into())
	}
}
