//! Artifact id cache implementations.

mod memory;

pub use memory::InMemoryArtifactCache;
