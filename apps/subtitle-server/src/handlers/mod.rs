pub mod health;
pub mod subtitles;
pub mod videos;
