//! # Stickerflow
//!
//! Builds a chat sticker set from a sticker set description, uploading only
//! what has not been uploaded before.
//!
//! Stickerflow provides:
//!
//! - **Rate-limited batches**: a concurrency cap with fixed-interval admission
//!   and an overall deadline ([`scheduler::RateLimitedScheduler`])
//! - **Per-call retries**: fixed, linear or exponential backoff with
//!   domain-level errors ([`retry::RetryingOperation`])
//! - **Per-user exclusion**: one active run per user ([`session::SessionGate`])
//! - **A staged pipeline**: fetch, partition by cache, download, normalize,
//!   upload, persist, create, append ([`pipeline::StickerPipeline`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stickerflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::from_file("stickerflow.json")?;
//! init_tracing(config.log_format)?;
//!
//! let ports = PipelinePorts::new(
//!     Arc::new(JsonSpecSource::new()),
//!     Arc::new(InMemoryArtifactCache::new()),
//!     Arc::new(ReqwestFetcher::new()?),
//!     Arc::new(SquareCanvasNormalizer::from_config(&config.canvas)),
//!     Arc::new(my_bot_api),
//!     Arc::new(LoggingProgressSink::default()),
//! );
//!
//! let pipeline = StickerPipeline::new(ports, config);
//! let summary = pipeline.run(UserId(42), &document).await?;
//! println!("{}", summary.set_link());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod config;
pub mod core;
pub mod errors;
pub mod imaging;
pub mod logging;
pub mod pipeline;
pub mod ports;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod spec_source;
pub mod testing;

#[cfg(feature = "http")]
pub mod http;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::InMemoryArtifactCache;
    pub use crate::config::{CanvasConfig, PipelineConfig, SetNaming, StagePolicy};
    pub use crate::core::{
        ArtifactId, ItemId, PipelineState, StickerItem, StickerSetSpec, UserId,
    };
    pub use crate::errors::{
        BatchError, ConcurrentSessionError, ConfigError, RetryExhaustedError, StageError,
        StickerflowError, TimeoutError, TransientRemoteError, ValidationError,
    };
    pub use crate::imaging::SquareCanvasNormalizer;
    pub use crate::logging::{init_tracing, LogFormat};
    pub use crate::pipeline::{PipelineSummary, SessionContext, StickerPipeline};
    pub use crate::ports::{
        ArtifactCache, ArtifactStore, ImageNormalizer, PipelinePorts, ProgressSink,
        RemoteFetcher, SpecSource,
    };
    pub use crate::progress::{CollectingProgressSink, LoggingProgressSink, NoOpProgressSink};
    pub use crate::retry::{BackoffStrategy, JitterStrategy, RetryPolicy, RetryingOperation};
    pub use crate::scheduler::{task, BatchPolicy, RateLimitedScheduler, Task};
    pub use crate::session::{SessionGate, SessionGuard};
    pub use crate::spec_source::{parse_sticker_set, JsonSpecSource};

    #[cfg(feature = "http")]
    pub use crate::http::ReqwestFetcher;
}

/// Version of the stickerflow crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
