use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use subtitle_queue::{AudioPayload, EngineError, Segment, TranscribeParams, Transcriber, Transcript};
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct InferenceSegment {
	start: f64,
	end: f64,
	text: String,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
	#[serde(default)]
	text: String,
	#[serde(default)]
	language: Option<String>,
	#[serde(default)]
	segments: Vec<InferenceSegment>,
}

/// Client for a whisper.cpp style `/inference` server answering `verbose_json`.
#[derive(Debug, Clone)]
pub struct WhisperHttpTranscriber {
	client: reqwest::Client,
	url: String,
}

impl WhisperHttpTranscriber {
	#[must_use]
	pub const fn new(client: reqwest::Client, url: String) -> Self {
		Self { client, url }
	}
}

fn into_transcript(response: InferenceResponse, model: &str) -> Transcript {
	let segments: Vec<Segment> = response
		.segments
		.into_iter()
		.map(|segment| Segment {
			start: segment.start,
			end: segment.end,
			text: segment.text.trim().to_string(),
		})
		.filter(|segment| !segment.text.is_empty())
		.collect();

	let mut transcript = Transcript::from_segments(segments, response.language);
	if transcript.text.is_empty() {
		transcript.text = response.text.trim().to_string();
	}
	transcript.meta.insert("engine".to_string(), serde_json::json!("whisper"));
	transcript.meta.insert("model".to_string(), serde_json::json!(model));
	transcript
}

// OpenAI-compatible servers pick the model per request; whisper.cpp ignores the field.
fn form_fields(params: &TranscribeParams) -> Vec<(&'static str, String)> {
	let mut fields = vec![
		("model", params.model.clone()),
		("response_format", "verbose_json".to_string()),
		("temperature", "0.0".to_string()),
	];
	if let Some(language) = &params.language {
		fields.push(("language", language.clone()));
	}
	fields
}

#[async_trait]
impl Transcriber for WhisperHttpTranscriber {
	#[instrument(skip(self, audio), fields(bytes = audio.bytes.len()))]
	async fn transcribe(&self, audio: &AudioPayload, params: &TranscribeParams) -> Result<Transcript, EngineError> {
		let file = Part::bytes(audio.bytes.to_vec())
			.file_name(format!("audio.{}", audio.format))
			.mime_str("audio/wav")
			.map_err(|e| EngineError::Internal(e.to_string()))?;
		let form = form_fields(params).into_iter().fold(Form::new().part("file", file), |form, (name, value)| form.text(name, value));

		let response = self
			.client
			.post(&self.url)
			.multipart(form)
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(|e| EngineError::Engine(format!("whisper request failed: {e}")))?;
		let body: InferenceResponse = response.json().await.map_err(|e| EngineError::Engine(format!("unreadable whisper response: {e}")))?;

		let transcript = into_transcript(body, &params.model);
		debug!(segments = transcript.segments.len(), language = ?transcript.language, "Transcribed audio");
		Ok(transcript)
	}
}
