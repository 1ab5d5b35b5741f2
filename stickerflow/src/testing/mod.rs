//! Testing utilities for sticker pipelines.
//!
//! This module provides:
//! - Fakes for every collaborator port, with call counters
//! - Sample sets and documents
//! - A harness wiring the fakes into [`PipelinePorts`](crate::ports::PipelinePorts)

mod fakes;
mod fixtures;

pub use fakes::{
    AppendedSticker, CreatedSet, FailingCache, FakeArtifactStore, FakeFetcher,
    PassthroughNormalizer, RecordingCache, StaticSpecSource,
};
pub use fixtures::{sample_document, sample_spec, sample_url, TestHarness};
