//! Job orchestration for subtitle generation.
//!
//! Deduplicates units of work across processes, caches finished results,
//! throttles clients, mirrors the external catalog and drives the engines
//! through a bounded worker pool. All shared state lives in a [`store::KvStore`].

pub mod catalog;
pub mod clock;
pub mod config;
pub mod engines;
pub mod error;
pub mod key;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod rate_limit;
pub mod result_cache;
pub mod service;
pub mod store;
pub mod tracker;

pub use catalog::{CatalogCache, CatalogOrigin, CatalogSnapshot, CatalogView};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, StoreFailurePolicy};
pub use engines::{AudioPayload, CatalogItem, CatalogSource, Engines, Retriever, Segment, SourceInfo, TranscribeParams, Transcriber, Transcript, Translator};
pub use error::{EngineError, ErrorKind, QueueError};
pub use key::{extract_video_id, Fingerprint, JobConfig, WorkKey, WorkKind};
pub use pool::{PoolSettings, WorkerPool};
pub use queue::{DispatchQueue, QueuedJob};
pub use rate_limit::{Admission, RateLimiter};
pub use result_cache::{ResultCache, ResultEntry};
pub use service::{StatusView, SubtitleService};
pub use store::{Keyspace, KvStore, MemoryStore, RedisStore, SharedStore};
pub use tracker::{JobOutcome, JobRecord, JobStatus, JobTracker, SubmitOutcome};
