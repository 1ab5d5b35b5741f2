//! Outcome of a successful run.

use super::context::SessionContext;
use crate::core::PipelineState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Run correlation id.
    pub run_id: Uuid,
    /// Destination set name.
    pub set_name: String,
    /// Destination set title.
    pub set_title: String,
    /// Items in the set.
    pub total: usize,
    /// Items whose artifact id came from the cache.
    pub reused: usize,
    /// Items that received a fresh artifact id.
    pub uploaded: usize,
    /// Of `uploaded`, items that shared an identical payload's upload.
    pub deduplicated: usize,
    /// Items appended after set creation.
    pub appended: usize,
    /// States visited, in order.
    pub states: Vec<PipelineState>,
    /// When the run was admitted.
    pub started_at: DateTime<Utc>,
    /// When the run reached `Completed`.
    pub finished_at: DateTime<Utc>,
}

impl PipelineSummary {
    pub(crate) fn from_context(
        ctx: &SessionContext,
        states: Vec<PipelineState>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: ctx.run_id,
            set_name: ctx.set_name.clone(),
            set_title: ctx.set_title.clone(),
            total: ctx.spec.len(),
            reused: ctx.reused,
            uploaded: ctx.fresh.len(),
            deduplicated: ctx.deduplicated,
            appended: ctx.appended,
            states,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Public link to the created set.
    #[must_use]
    pub fn set_link(&self) -> String {
        format!("https://t.me/addstickers/{}", self.set_name)
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
