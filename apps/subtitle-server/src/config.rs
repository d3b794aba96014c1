use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Which halves of the system this process runs.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
	Api,
	Worker,
	All,
}

impl Role {
	#[must_use]
	pub const fn serves_http(self) -> bool {
		matches!(self, Self::Api | Self::All)
	}

	#[must_use]
	pub const fn runs_workers(self) -> bool {
		matches!(self, Self::Worker | Self::All)
	}
}

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Subtitle generation API and worker")]
pub struct ServerConfig {
	#[command(flatten)]
	pub queue: subtitle_queue::Config,

	#[arg(long, env = "ROLE", value_enum, default_value = "all")]
	pub role: Role,

	#[arg(long, env = "HOST", default_value = "0.0.0.0")]
	pub host: String,

	#[arg(long, env = "PORT", default_value = "8000")]
	pub port: u16,

	#[arg(long, env = "RUST_LOG", default_value = "info,tower_http=debug")]
	pub rust_log: String,

	/// Emit logs as JSON lines
	#[arg(long, env = "LOG_JSON")]
	pub log_json: bool,

	#[arg(long, env = "YTDLP_PATH", default_value = "yt-dlp")]
	pub ytdlp_path: String,

	/// Cookies file handed to yt-dlp for age-gated or private sources
	#[arg(long, env = "YTDLP_COOKIES_FILE")]
	pub ytdlp_cookies: Option<PathBuf>,

	/// whisper.cpp compatible inference endpoint
	#[arg(long, env = "WHISPER_URL", default_value = "http://127.0.0.1:8080/inference")]
	pub whisper_url: String,

	#[arg(long, env = "TRANSLATE_URL", default_value = "http://127.0.0.1:5000/translate")]
	pub translate_url: String,

	#[arg(long, env = "TRANSLATE_API_KEY")]
	pub translate_api_key: Option<String>,

	/// JSON endpoint listing catalog items
	#[arg(long, env = "CATALOG_URL", default_value = "http://127.0.0.1:8001/videos")]
	pub catalog_url: String,

	#[arg(
        long = "http-timeout-secs",
        env = "HTTP_TIMEOUT_SECS",
        default_value = "900",
        value_parser = parse_duration,
        help = "Timeout for calls to the inference and translation servers"
    )]
	pub http_timeout: Duration,
}

impl ServerConfig {
	/// # Errors
	/// Returns a description of the first invalid option.
	pub fn validate(&self) -> Result<(), String> {
		self.queue.validate().map_err(|e| e.to_string())?;
		if self.port == 0 {
			return Err("port must be non-zero".to_string());
		}
		if self.http_timeout.is_zero() {
			return Err("http_timeout must be greater than 0".to_string());
		}
		Ok(())
	}

	#[must_use]
	pub fn bind_addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

fn parse_duration(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_flattened_queue_options() {
		let config = ServerConfig::try_parse_from(["subtitle-server", "--role", "worker", "--port", "9000", "--worker-concurrency", "4", "--rate-limit-max", "10"]).unwrap();
		assert_eq!(config.role, Role::Worker);
		assert!(config.role.runs_workers());
		assert!(!config.role.serves_http());
		assert_eq!(config.bind_addr(), "0.0.0.0:9000");
		assert_eq!(config.queue.worker_concurrency, 4);
		assert_eq!(config.queue.rate_limit_max, 10);
		assert!(config.validate().is_ok());
	}
}
