use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use subtitle_queue::{AudioPayload, EngineError, Retriever, SourceInfo};
use tokio::process::Command;
use tracing::{debug, instrument};

const TARGET_SAMPLE_RATE: u32 = 16_000;
const WAV_HEADER_LEN: usize = 44;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
	title: Option<String>,
	uploader: Option<String>,
	channel: Option<String>,
	duration: Option<f64>,
	is_live: Option<bool>,
}

/// Retrieves sources by shelling out to `yt-dlp`, extracting 16 kHz mono WAV.
#[derive(Debug, Clone)]
pub struct YtDlpRetriever {
	binary: String,
	cookies: Option<PathBuf>,
}

impl YtDlpRetriever {
	#[must_use]
	pub const fn new(binary: String, cookies: Option<PathBuf>) -> Self {
		Self { binary, cookies }
	}

	fn command(&self) -> Command {
		let mut command = Command::new(&self.binary);
		command.arg("--no-playlist").arg("--no-warnings").stdin(Stdio::null()).kill_on_drop(true);
		if let Some(cookies) = &self.cookies {
			command.arg("--cookies").arg(cookies);
		}
		command
	}

	async fn run(mut command: Command) -> Result<Vec<u8>, EngineError> {
		let output = command.output().await.map_err(|e| EngineError::Internal(format!("failed to spawn yt-dlp: {e}")))?;
		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr);
			let last_line = stderr.lines().rev().find(|line| !line.trim().is_empty()).unwrap_or("no output");
			return Err(EngineError::Retrieval(format!("yt-dlp exited with {}: {last_line}", output.status)));
		}
		Ok(output.stdout)
	}
}

fn parse_probe(stdout: &[u8]) -> Result<SourceInfo, EngineError> {
	let probe: ProbeOutput = serde_json::from_slice(stdout).map_err(|e| EngineError::Retrieval(format!("unreadable yt-dlp metadata: {e}")))?;
	if probe.is_live == Some(true) {
		return Err(EngineError::Retrieval("live streams are not supported".to_string()));
	}
	Ok(SourceInfo {
		title: probe.title,
		uploader: probe.uploader.or(probe.channel),
		duration_sec: probe.duration,
	})
}

// 16-bit mono PCM after the canonical header.
#[allow(clippy::cast_precision_loss)]
fn wav_duration(bytes: &[u8]) -> Option<f64> {
	let samples = bytes.len().checked_sub(WAV_HEADER_LEN)? / 2;
	Some(samples as f64 / f64::from(TARGET_SAMPLE_RATE))
}

async fn find_output(dir: &Path) -> Result<PathBuf, EngineError> {
	let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| EngineError::Internal(e.to_string()))?;
	while let Some(entry) = entries.next_entry().await.map_err(|e| EngineError::Internal(e.to_string()))? {
		let path = entry.path();
		if path.extension().is_some_and(|ext| ext == "wav") {
			return Ok(path);
		}
	}
	Err(EngineError::Retrieval("yt-dlp produced no audio file".to_string()))
}

#[async_trait]
impl Retriever for YtDlpRetriever {
	#[instrument(skip(self))]
	async fn probe(&self, source_ref: &str) -> Result<SourceInfo, EngineError> {
		let mut command = self.command();
		command.arg("--dump-single-json").arg("--skip-download").arg(source_ref);
		let stdout = Self::run(command).await?;
		let info = parse_probe(&stdout)?;
		debug!(title = ?info.title, duration = ?info.duration_sec, "Probed source");
		Ok(info)
	}

	#[instrument(skip(self))]
	async fn fetch_audio(&self, source_ref: &str) -> Result<AudioPayload, EngineError> {
		let workdir = tempfile::tempdir().map_err(|e| EngineError::Internal(format!("no temp dir: {e}")))?;
		let template = workdir.path().join("audio.%(ext)s");

		let mut command = self.command();
		command
			.arg("--format")
			.arg("bestaudio/best")
			.arg("--extract-audio")
			.arg("--audio-format")
			.arg("wav")
			.arg("--postprocessor-args")
			.arg(format!("ffmpeg:-ar {TARGET_SAMPLE_RATE} -ac 1 -c:a pcm_s16le"))
			.arg("--output")
			.arg(&template)
			.arg(source_ref);
		Self::run(command).await?;

		let path = find_output(workdir.path()).await?;
		let bytes = tokio::fs::read(&path).await.map_err(|e| EngineError::Internal(format!("could not read {}: {e}", path.display())))?;
		debug!(bytes = bytes.len(), "Fetched audio");

		Ok(AudioPayload {
			duration_sec: wav_duration(&bytes),
			bytes: Bytes::from(bytes),
			format: "wav".to_string(),
		})
	}
}
