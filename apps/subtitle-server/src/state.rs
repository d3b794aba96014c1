use subtitle_queue::SubtitleService;

#[derive(Clone)]
pub struct AppState {
	pub service: SubtitleService,
}

impl AppState {
	#[must_use]
	pub const fn new(service: SubtitleService) -> Self {
		Self { service }
	}
}
