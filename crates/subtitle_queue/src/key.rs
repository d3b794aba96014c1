use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Bumped whenever the processing pipeline changes in a way that invalidates stored results.
pub const PIPELINE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
	Transcribe,
	Translate,
}

impl WorkKind {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Transcribe => "transcribe",
			Self::Translate => "translate",
		}
	}
}

/// Identity of one unit of work: a source, what to do with it, and for what language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkKey {
	subject_id: String,
	kind: WorkKind,
	variant: Option<String>,
}

impl WorkKey {
	#[must_use]
	pub fn transcription(subject_id: impl Into<String>) -> Self {
		Self {
			subject_id: subject_id.into(),
			kind: WorkKind::Transcribe,
			variant: None,
		}
	}

	#[must_use]
	pub fn translation(subject_id: impl Into<String>, target_language: impl Into<String>) -> Self {
		Self {
			subject_id: subject_id.into(),
			kind: WorkKind::Translate,
			variant: Some(normalize_language(&target_language.into())),
		}
	}

	/// Transcription when no target language is given, translation otherwise.
	#[must_use]
	pub fn for_request(subject_id: impl Into<String>, target_language: Option<&str>) -> Self {
		match target_language.map(str::trim).filter(|lang| !lang.is_empty()) {
			Some(lang) => Self::translation(subject_id, lang),
			None => Self::transcription(subject_id),
		}
	}

	#[must_use]
	pub fn subject_id(&self) -> &str {
		&self.subject_id
	}

	#[must_use]
	pub const fn kind(&self) -> WorkKind {
		self.kind
	}

	#[must_use]
	pub fn variant(&self) -> Option<&str> {
		self.variant.as_deref()
	}

	/// The transcription this key depends on (itself for transcription keys).
	#[must_use]
	pub fn transcription_key(&self) -> Self {
		Self::transcription(self.subject_id.clone())
	}

	/// Stable storage form, `subject:kind[:variant]`.
	#[must_use]
	pub fn storage_key(&self) -> String {
		self.to_string()
	}
}

impl fmt::Display for WorkKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.variant {
			Some(variant) => write!(f, "{}:{}:{}", self.subject_id, self.kind.as_str(), variant),
			None => write!(f, "{}:{}", self.subject_id, self.kind.as_str()),
		}
	}
}

fn normalize_language(lang: &str) -> String {
	lang.trim().to_lowercase()
}

/// Engine parameters a result was (or will be) computed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
	pub asr_model: String,
	pub source_language: Option<String>,
	pub target_language: Option<String>,
	pub pipeline_version: u32,
}

impl JobConfig {
	#[must_use]
	pub fn new(asr_model: impl Into<String>, source_language: Option<String>, target_language: Option<String>) -> Self {
		Self {
			asr_model: asr_model.into(),
			source_language: source_language.map(|lang| normalize_language(&lang)),
			target_language: target_language.map(|lang| normalize_language(&lang)),
			pipeline_version: PIPELINE_VERSION,
		}
	}

	/// The config of the transcription step underneath a translation.
	#[must_use]
	pub fn for_transcription(&self) -> Self {
		Self {
			target_language: None,
			..self.clone()
		}
	}

	#[must_use]
	pub fn fingerprint(&self) -> Fingerprint {
		let canonical = format!(
			"v{}|model={}|src={}|dst={}",
			self.pipeline_version,
			self.asr_model,
			self.source_language.as_deref().unwrap_or("auto"),
			self.target_language.as_deref().unwrap_or("-"),
		);
		let digest = Sha256::digest(canonical.as_bytes());
		Fingerprint(hex::encode(&digest[..8]))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Pull the video id out of a `youtube.com/watch?v=` or `youtu.be/` URL.
#[must_use]
pub fn extract_video_id(url: &str) -> Option<String> {
	let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
	let (authority, rest) = without_scheme.split_once('/').unwrap_or((without_scheme, ""));
	let host = authority.rsplit('@').next().unwrap_or(authority).split(':').next().unwrap_or(authority).to_lowercase();

	let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
	let query = query.split('#').next().unwrap_or("");

	if host == "youtu.be" || host == "www.youtu.be" {
		let id = path.split(['/', '#']).next().unwrap_or("");
		return (!id.is_empty()).then(|| id.to_string());
	}

	query
		.split('&')
		.filter_map(|pair| pair.split_once('='))
		.find(|(name, _)| *name == "v")
		.map(|(_, value)| value.to_string())
		.filter(|value| !value.is_empty())
}
