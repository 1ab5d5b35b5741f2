//! Pipeline state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of one pipeline run.
///
/// States advance strictly in declaration order; `Failed` is reachable from
/// any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// The request was admitted.
    Received,
    /// The input document was parsed and validated.
    SpecFetched,
    /// Items were split into cached and needs-upload partitions.
    Partitioned,
    /// Source bytes were fetched for the needs-upload partition.
    Downloaded,
    /// Downloaded payloads were normalized.
    Processed,
    /// Normalized payloads were uploaded.
    Uploaded,
    /// Fresh artifact ids were written to the cache.
    CachePersisted,
    /// The destination set was created from the first item.
    SetCreated,
    /// Every remaining item was appended.
    Completed,
    /// A stage failed.
    Failed,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Received
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::SpecFetched => "spec_fetched",
            Self::Partitioned => "partitioned",
            Self::Downloaded => "downloaded",
            Self::Processed => "processed",
            Self::Uploaded => "uploaded",
            Self::CachePersisted => "cache_persisted",
            Self::SetCreated => "set_created",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl PipelineState {
    /// Returns the successor state on the success path.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::SpecFetched),
            Self::SpecFetched => Some(Self::Partitioned),
            Self::Partitioned => Some(Self::Downloaded),
            Self::Downloaded => Some(Self::Processed),
            Self::Processed => Some(Self::Uploaded),
            Self::Uploaded => Some(Self::CachePersisted),
            Self::CachePersisted => Some(Self::SetCreated),
            Self::SetCreated => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if `to` is a legal transition from this state.
    #[must_use]
    pub fn can_transition_to(&self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }
}
