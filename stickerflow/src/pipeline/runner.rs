//! The sticker pipeline state machine.

use super::context::SessionContext;
use super::stages;
use super::summary::PipelineSummary;
use crate::config::PipelineConfig;
use crate::core::{PipelineState, UserId};
use crate::errors::{ConcurrentSessionError, StickerflowError};
use crate::ports::PipelinePorts;
use crate::session::SessionGate;
use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Records the states one run passes through.
#[derive(Debug)]
struct StateTracker {
    current: PipelineState,
    visited: Vec<PipelineState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self {
            current: PipelineState::Received,
            visited: vec![PipelineState::Received],
        }
    }
}

impl StateTracker {
    fn advance(&mut self, to: PipelineState) {
        if !self.current.can_transition_to(to) {
            warn!(from = %self.current, to = %to, "Ignoring illegal state transition");
            return;
        }
        info!(from = %self.current, to = %to, "State transition");
        self.current = to;
        self.visited.push(to);
    }
}

/// Drives one user's sticker set from input document to finished set.
///
/// At most one run per user is active at a time; a second concurrent
/// request for the same user is rejected, not queued.
#[derive(Debug, Clone)]
pub struct StickerPipeline {
    ports: PipelinePorts,
    gate: SessionGate,
    config: PipelineConfig,
}

impl StickerPipeline {
    /// Creates a pipeline with its own session gate.
    #[must_use]
    pub fn new(ports: PipelinePorts, config: PipelineConfig) -> Self {
        Self {
            ports,
            gate: SessionGate::new(),
            config,
        }
    }

    /// Shares `gate` with other pipelines in the process.
    #[must_use]
    pub fn with_gate(mut self, gate: SessionGate) -> Self {
        self.gate = gate;
        self
    }

    /// The session gate.
    #[must_use]
    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline for `user` over the document at `locator`.
    ///
    /// Progress and the final outcome are reported through the progress
    /// sink. Faults reach the user only as a generic message; the cause is
    /// logged.
    pub async fn run(&self, user: UserId, locator: &str) -> Result<PipelineSummary, StickerflowError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sticker_pipeline", %run_id, user_id = %user);
        self.run_in_session(run_id, user, locator).instrument(span).await
    }

    async fn run_in_session(
        &self,
        run_id: Uuid,
        user: UserId,
        locator: &str,
    ) -> Result<PipelineSummary, StickerflowError> {
        let Some(guard) = self.gate.lock(user) else {
            info!("Rejected: a run is already active for this user");
            let err = StickerflowError::from(ConcurrentSessionError::new(user));
            self.notify(user, &err.user_message()).await;
            return Err(err);
        };

        let started_at = Utc::now();
        let mut tracker = StateTracker::default();
        let outcome = self.execute(run_id, user, locator, &mut tracker).await;

        match outcome {
            Ok(ctx) => {
                tracker.advance(PipelineState::Completed);
                guard.release();

                let summary = PipelineSummary::from_context(&ctx, tracker.visited, started_at);
                info!(
                    set_name = %summary.set_name,
                    total = summary.total,
                    reused = summary.reused,
                    uploaded = summary.uploaded,
                    appended = summary.appended,
                    "Pipeline completed"
                );
                self.notify(
                    user,
                    &format!("Done! Your sticker set is ready: {}", ctx.set_link()),
                )
                .await;
                Ok(summary)
            }
            Err(err) => {
                tracker.advance(PipelineState::Failed);
                guard.release();

                if err.is_fault() {
                    error!(
                        kind = err.kind(),
                        error = %err,
                        cause = err.cause().unwrap_or("unknown"),
                        "Pipeline failed"
                    );
                } else {
                    info!(kind = err.kind(), error = %err, "Pipeline rejected input");
                }
                self.notify(user, &err.user_message()).await;
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        run_id: Uuid,
        user: UserId,
        locator: &str,
        tracker: &mut StateTracker,
    ) -> Result<SessionContext, StickerflowError> {
        let ports = &self.ports;
        let config = &self.config;

        let spec = stages::fetch_spec(ports.specs.as_ref(), locator).await?;
        let ctx = SessionContext::new(run_id, user, spec, &config.naming);
        tracker.advance(PipelineState::SpecFetched);
        self.notify(
            user,
            &format!(
                "Got \"{}\" with {} sticker(s). Starting.",
                ctx.set_title,
                ctx.spec.len()
            ),
        )
        .await;

        let ctx = stages::partition(ctx, ports.cache.as_ref()).await?;
        tracker.advance(PipelineState::Partitioned);
        if ctx.reused > 0 {
            self.notify(
                user,
                &format!(
                    "{} sticker(s) were uploaded before and will be reused.",
                    ctx.reused
                ),
            )
            .await;
        }

        let ctx = stages::download(ctx, ports.fetcher.clone(), &config.download).await?;
        tracker.advance(PipelineState::Downloaded);
        self.notify(
            user,
            &format!("Downloaded {} image(s).", ctx.needs_upload.len()),
        )
        .await;

        let ctx = stages::process(ctx, ports.normalizer.clone()).await?;
        tracker.advance(PipelineState::Processed);

        let ctx = stages::upload(ctx, ports.store.clone(), &config.upload).await?;
        tracker.advance(PipelineState::Uploaded);
        self.notify(user, &format!("Uploaded {} sticker(s).", ctx.fresh.len()))
            .await;

        let ctx = stages::persist_cache(ctx, ports.cache.as_ref()).await?;
        tracker.advance(PipelineState::CachePersisted);

        let ctx = stages::create_set(ctx, ports.store.as_ref(), &config.create_set_retry).await?;
        tracker.advance(PipelineState::SetCreated);
        self.notify(
            user,
            &format!("Created sticker set \"{}\". Adding the rest.", ctx.set_title),
        )
        .await;

        stages::append_remaining(ctx, ports.store.clone(), &config.append).await
    }

    async fn notify(&self, user: UserId, message: &str) {
        if let Err(e) = self.ports.progress.notify(user, message).await {
            warn!(error = %e, "Progress notification failed");
        }
    }
}
