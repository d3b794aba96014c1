pub mod catalog_http;
pub mod libretranslate;
pub mod whisper_http;
pub mod ytdlp;

use std::sync::Arc;
use subtitle_queue::Engines;

use crate::config::ServerConfig;

pub use catalog_http::HttpCatalogSource;
pub use libretranslate::LibreTranslator;
pub use whisper_http::WhisperHttpTranscriber;
pub use ytdlp::YtDlpRetriever;

/// Production engines as configured.
#[must_use]
pub fn engines(config: &ServerConfig, client: &reqwest::Client) -> Engines {
	Engines {
		retriever: Arc::new(YtDlpRetriever::new(config.ytdlp_path.clone(), config.ytdlp_cookies.clone())),
		transcriber: Arc::new(WhisperHttpTranscriber::new(client.clone(), config.whisper_url.clone())),
		translator: Arc::new(LibreTranslator::new(client.clone(), config.translate_url.clone(), config.translate_api_key.clone())),
	}
}
