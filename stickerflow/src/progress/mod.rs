//! Progress sink implementations.

mod sink;

pub use sink::{CollectingProgressSink, LoggingProgressSink, NoOpProgressSink};
