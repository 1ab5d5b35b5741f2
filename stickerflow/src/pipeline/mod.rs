//! Staged sticker set pipeline.
//!
//! `Received -> SpecFetched -> Partitioned -> Downloaded -> Processed ->
//! Uploaded -> CachePersisted -> SetCreated -> Completed`, with `Failed`
//! reachable from every non-terminal state.
//!
//! Scheduler batches stop admitting work on the first failure or timeout but
//! do not abort tasks already dispatched. A timed-out upload may still land
//! after the run reported failure; the next run re-uploads that item.

mod context;
mod runner;
pub mod stages;
mod summary;

#[cfg(test)]
mod integration_tests;

pub use context::SessionContext;
pub use runner::StickerPipeline;
pub use summary::PipelineSummary;
