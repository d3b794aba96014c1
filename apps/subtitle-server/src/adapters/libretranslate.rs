use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use subtitle_queue::{EngineError, Segment, Transcript, Translator};
use tracing::{debug, instrument};

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
	q: Vec<&'a str>,
	source: &'a str,
	target: &'a str,
	format: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
	translated_text: Vec<String>,
}

/// Segment-wise translation through a LibreTranslate server.
#[derive(Debug, Clone)]
pub struct LibreTranslator {
	client: reqwest::Client,
	url: String,
	api_key: Option<String>,
}

impl LibreTranslator {
	#[must_use]
	pub const fn new(client: reqwest::Client, url: String, api_key: Option<String>) -> Self {
		Self { client, url, api_key }
	}
}

fn zip_segments(segments: &[Segment], translated: Vec<String>) -> Result<Vec<Segment>, EngineError> {
	if translated.len() != segments.len() {
		return Err(EngineError::Engine(format!("translator returned {} segments for {}", translated.len(), segments.len())));
	}
	Ok(segments
		.iter()
		.zip(translated)
		.map(|(segment, text)| Segment {
			start: segment.start,
			end: segment.end,
			text,
		})
		.collect())
}

#[async_trait]
impl Translator for LibreTranslator {
	#[instrument(skip(self, segments), fields(segments = segments.len()))]
	async fn translate(&self, segments: &[Segment], source_lang: Option<&str>, target_lang: &str) -> Result<Transcript, EngineError> {
		if segments.is_empty() {
			return Ok(Transcript::from_segments(Vec::new(), Some(target_lang.to_string())));
		}

		let request = TranslateRequest {
			q: segments.iter().map(|segment| segment.text.as_str()).collect(),
			source: source_lang.unwrap_or("auto"),
			target: target_lang,
			format: "text",
			api_key: self.api_key.as_deref(),
		};
		let response = self
			.client
			.post(&self.url)
			.json(&request)
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(|e| EngineError::Engine(format!("translation request failed: {e}")))?;
		let body: TranslateResponse = response.json().await.map_err(|e| EngineError::Engine(format!("unreadable translation response: {e}")))?;

		let translated = zip_segments(segments, body.translated_text)?;
		debug!(target = target_lang, "Translated segments");
		let mut transcript = Transcript::from_segments(translated, Some(target_lang.to_string()));
		transcript.meta.insert("translated_from".to_string(), serde_json::json!(source_lang.unwrap_or("auto")));
		Ok(transcript)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_translations_keep_timings() {
		let segments = vec![
			Segment { start: 0.0, end: 1.0, text: "hello".into() },
			Segment { start: 1.0, end: 2.0, text: "world".into() },
		];
		let body: TranslateResponse = serde_json::from_str(r#"{"translatedText":["привет","мир"]}"#).unwrap();
		let translated = zip_segments(&segments, body.translated_text).unwrap();
		assert_eq!(translated[1].start, 1.0);
		assert_eq!(translated[1].text, "мир");

		assert!(zip_segments(&segments, vec!["one".into()]).is_err());
	}
}
