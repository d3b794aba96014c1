//! Narrow interfaces to the collaborators that do the expensive work.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineError;

/// Metadata about a remote source, obtainable without downloading it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
	pub title: Option<String>,
	pub uploader: Option<String>,
	pub duration_sec: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AudioPayload {
	pub bytes: Bytes,
	/// Container or codec name, e.g. `wav`.
	pub format: String,
	pub duration_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
	pub start: f64,
	pub end: f64,
	pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
	pub text: String,
	pub language: Option<String>,
	pub segments: Vec<Segment>,
	#[serde(default)]
	pub meta: HashMap<String, serde_json::Value>,
}

impl Transcript {
	/// Builds a transcript whose text is the segments joined by spaces.
	#[must_use]
	pub fn from_segments(segments: Vec<Segment>, language: Option<String>) -> Self {
		let text = segments.iter().map(|segment| segment.text.trim()).filter(|text| !text.is_empty()).collect::<Vec<_>>().join(" ");
		Self {
			text,
			language,
			segments,
			meta: HashMap::new(),
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct TranscribeParams {
	pub model: String,
	pub language: Option<String>,
}

/// One entry of the external catalog listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
	pub video_id: String,
	#[serde(default)]
	pub title: Option<String>,
	#[serde(default)]
	pub uploader: Option<String>,
	#[serde(default)]
	pub duration_sec: Option<f64>,
	#[serde(default)]
	pub source_url: Option<String>,
	#[serde(flatten)]
	pub extra: HashMap<String, serde_json::Value>,
}

#[async_trait]
pub trait Retriever: Send + Sync {
	async fn probe(&self, source_ref: &str) -> Result<SourceInfo, EngineError>;

	async fn fetch_audio(&self, source_ref: &str) -> Result<AudioPayload, EngineError>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
	async fn transcribe(&self, audio: &AudioPayload, params: &TranscribeParams) -> Result<Transcript, EngineError>;
}

#[async_trait]
pub trait Translator: Send + Sync {
	async fn translate(&self, segments: &[Segment], source_lang: Option<&str>, target_lang: &str) -> Result<Transcript, EngineError>;
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
	async fn list_items(&self) -> Result<Vec<CatalogItem>, EngineError>;
}

/// The set of collaborators a worker pool drives.
#[derive(Clone)]
pub struct Engines {
	pub retriever: Arc<dyn Retriever>,
	pub transcriber: Arc<dyn Transcriber>,
	pub translator: Arc<dyn Translator>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_transcript_from_segments_joins_text() {
		let segments = vec![
			Segment { start: 0.0, end: 1.0, text: " hello ".into() },
			Segment { start: 1.0, end: 1.5, text: String::new() },
			Segment { start: 1.5, end: 2.0, text: "world".into() },
		];
		let transcript = Transcript::from_segments(segments, Some("en".into()));
		assert_eq!(transcript.text, "hello world");
		assert_eq!(transcript.segments.len(), 3);
	}

	#[test]
	fn test_catalog_item_keeps_unknown_fields() {
		let item: CatalogItem = serde_json::from_str(r#"{"video_id":"abc","title":"T","views":12}"#).unwrap();
		assert_eq!(item.video_id, "abc");
		assert_eq!(item.extra.get("views"), Some(&serde_json::json!(12)));
	}
}
