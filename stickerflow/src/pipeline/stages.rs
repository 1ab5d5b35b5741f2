//! Stage functions.
//!
//! Each stage takes the [`SessionContext`] by value and returns it updated,
//! so the data flowing between stages is visible at every boundary. Fan-out
//! stages run one [`RateLimitedScheduler`] batch with each task wrapped in a
//! [`RetryingOperation`]; batch failures and timeouts become [`StageError`]s.

use super::context::SessionContext;
use crate::config::StagePolicy;
use crate::core::{ArtifactId, ItemId, StickerSetSpec};
use crate::errors::{BatchError, RetryExhaustedError, StageError, StickerflowError};
use crate::ports::{ArtifactCache, ArtifactStore, ImageNormalizer, RemoteFetcher, SpecSource};
use crate::retry::{RetryPolicy, RetryingOperation};
use crate::scheduler::{task, RateLimitedScheduler, Task};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) const PARTITION: &str = "partition";
pub(crate) const DOWNLOAD: &str = "download";
pub(crate) const PROCESS: &str = "process";
pub(crate) const UPLOAD: &str = "upload";
pub(crate) const PERSIST_CACHE: &str = "persist cache";
pub(crate) const CREATE_SET: &str = "create set";
pub(crate) const APPEND: &str = "append";

fn batch_failure<E: Display>(stage: &str, err: BatchError<E>) -> StickerflowError {
    StageError::new(stage).with_cause(err).into()
}

fn missing_payload(stage: &str, id: ItemId) -> StageError {
    StageError::new(stage).with_cause(format!("sticker {id} has no payload"))
}

fn missing_artifact(stage: &str, id: ItemId) -> StageError {
    StageError::new(stage).with_cause(format!("sticker {id} has no artifact id"))
}

/// Fetches and validates the set description.
pub async fn fetch_spec(specs: &dyn SpecSource, locator: &str) -> Result<StickerSetSpec, StickerflowError> {
    Ok(specs.fetch(locator).await?)
}

/// Splits items into cached and needs-upload, preserving declared order.
pub async fn partition(
    mut ctx: SessionContext,
    cache: &dyn ArtifactCache,
) -> Result<SessionContext, StickerflowError> {
    let cached = cache
        .get_all()
        .await
        .map_err(|e| StageError::new(PARTITION).with_cause(e))?;

    for item in &mut ctx.spec.items {
        if let Some(artifact) = cached.get(&item.id) {
            item.artifact_id = Some(artifact.clone());
            ctx.reused += 1;
        } else {
            ctx.needs_upload.push(item.id);
        }
    }

    info!(
        reused = ctx.reused,
        needs_upload = ctx.needs_upload.len(),
        "Partitioned by cache"
    );
    Ok(ctx)
}

/// Downloads source bytes for the needs-upload partition.
pub async fn download(
    mut ctx: SessionContext,
    fetcher: Arc<dyn RemoteFetcher>,
    policy: &StagePolicy,
) -> Result<SessionContext, StickerflowError> {
    let tasks: Vec<Task<(ItemId, Vec<u8>), RetryExhaustedError>> = ctx
        .pending_items()
        .map(|item| {
            let fetcher = Arc::clone(&fetcher);
            let url = item.source_url.clone();
            let id = item.id;
            let retry = RetryingOperation::new(format!("download sticker {id}"), policy.retry.clone());
            task(move || async move {
                let bytes = retry.run(|| fetcher.get(&url)).await;
                bytes.map(|bytes| {
                    debug!(item_id = %id, bytes = bytes.len(), "Downloaded source");
                    (id, bytes)
                })
            })
        })
        .collect();

    let downloaded = RateLimitedScheduler::new(DOWNLOAD, policy.batch.clone())
        .run(tasks)
        .await
        .map_err(|e| batch_failure(DOWNLOAD, e))?;

    for (id, bytes) in downloaded {
        if let Some(item) = ctx.spec.item_mut(id) {
            item.payload = Some(bytes);
        }
    }
    Ok(ctx)
}

/// Normalizes every downloaded payload, all at once on the blocking pool.
pub async fn process(
    mut ctx: SessionContext,
    normalizer: Arc<dyn ImageNormalizer>,
) -> Result<SessionContext, StickerflowError> {
    let mut jobs = Vec::with_capacity(ctx.needs_upload.len());

    for &id in &ctx.needs_upload {
        let payload = ctx
            .spec
            .item_mut(id)
            .and_then(|item| item.payload.take())
            .ok_or_else(|| missing_payload(PROCESS, id))?;
        let normalizer = Arc::clone(&normalizer);

        jobs.push(async move {
            tokio::task::spawn_blocking(move || normalizer.normalize(&payload))
                .await
                .map_err(|e| StageError::new(PROCESS).with_cause(e))?
                .map(|bytes| (id, bytes))
                .map_err(|e| StageError::new(PROCESS).with_cause(format!("sticker {id}: {e}")))
        });
    }

    let processed = futures::future::try_join_all(jobs).await?;
    for (id, bytes) in processed {
        if let Some(item) = ctx.spec.item_mut(id) {
            item.payload = Some(bytes);
        }
    }
    Ok(ctx)
}

/// Uploads processed payloads and records the returned artifact ids.
///
/// Items with byte-identical payloads share one upload.
pub async fn upload(
    mut ctx: SessionContext,
    store: Arc<dyn ArtifactStore>,
    policy: &StagePolicy,
) -> Result<SessionContext, StickerflowError> {
    let mut leads: Vec<(ItemId, Vec<u8>)> = Vec::new();
    let mut lead_by_digest: HashMap<String, ItemId> = HashMap::new();
    let mut followers: HashMap<ItemId, Vec<ItemId>> = HashMap::new();

    for &id in &ctx.needs_upload {
        let payload = ctx
            .spec
            .item_mut(id)
            .and_then(|item| item.payload.take())
            .ok_or_else(|| missing_payload(UPLOAD, id))?;
        let digest = hex::encode(Sha256::digest(&payload));

        if let Some(&lead) = lead_by_digest.get(&digest) {
            debug!(item_id = %id, lead = %lead, "Identical payload, sharing upload");
            followers.entry(lead).or_default().push(id);
            ctx.deduplicated += 1;
        } else {
            lead_by_digest.insert(digest, id);
            leads.push((id, payload));
        }
    }

    let user = ctx.user_id;
    let tasks: Vec<Task<(ItemId, ArtifactId), RetryExhaustedError>> = leads
        .into_iter()
        .map(|(lead, payload)| {
            let store = Arc::clone(&store);
            let retry = RetryingOperation::new(format!("upload sticker {lead}"), policy.retry.clone());
            task(move || async move {
                let artifact = retry.run(|| store.upload(user, &payload)).await;
                artifact.map(|artifact| {
                    debug!(item_id = %lead, artifact = %artifact, "Uploaded");
                    (lead, artifact)
                })
            })
        })
        .collect();

    let uploaded = RateLimitedScheduler::new(UPLOAD, policy.batch.clone())
        .run(tasks)
        .await
        .map_err(|e| batch_failure(UPLOAD, e))?;

    for (lead, artifact) in uploaded {
        let shared = followers.remove(&lead).unwrap_or_default();
        for id in std::iter::once(lead).chain(shared) {
            if let Some(item) = ctx.spec.item_mut(id) {
                item.artifact_id = Some(artifact.clone());
            }
            ctx.fresh.insert(id, artifact.clone());
        }
    }

    if ctx.deduplicated > 0 {
        info!(deduplicated = ctx.deduplicated, "Skipped duplicate uploads");
    }
    Ok(ctx)
}

/// Writes this run's fresh artifact ids to the cache in one batch.
pub async fn persist_cache(
    ctx: SessionContext,
    cache: &dyn ArtifactCache,
) -> Result<SessionContext, StickerflowError> {
    if ctx.fresh.is_empty() {
        debug!("No fresh artifact ids to persist");
        return Ok(ctx);
    }

    cache
        .put_all(&ctx.fresh)
        .await
        .map_err(|e| StageError::new(PERSIST_CACHE).with_cause(e))?;

    debug!(entries = ctx.fresh.len(), "Persisted artifact ids");
    Ok(ctx)
}

/// Creates the destination set from the first declared item.
pub async fn create_set(
    ctx: SessionContext,
    store: &dyn ArtifactStore,
    retry: &RetryPolicy,
) -> Result<SessionContext, StickerflowError> {
    let first = ctx
        .spec
        .first()
        .ok_or_else(|| StageError::new(CREATE_SET).with_cause("sticker set is empty"))?;
    let artifact = first
        .artifact_id
        .clone()
        .ok_or_else(|| missing_artifact(CREATE_SET, first.id))?;

    RetryingOperation::new("create sticker set", retry.clone())
        .run(|| {
            store.create_set(
                ctx.user_id,
                &ctx.set_name,
                &ctx.set_title,
                &artifact,
                &first.emojis,
            )
        })
        .await
        .map_err(|e| StageError::new(CREATE_SET).with_cause(e))?;

    info!(set_name = %ctx.set_name, "Created sticker set");
    Ok(ctx)
}

/// Appends every item after the first, in declared order of submission.
pub async fn append_remaining(
    mut ctx: SessionContext,
    store: Arc<dyn ArtifactStore>,
    policy: &StagePolicy,
) -> Result<SessionContext, StickerflowError> {
    let remainder = ctx.spec.remainder();
    if remainder.is_empty() {
        debug!("Nothing to append");
        return Ok(ctx);
    }

    let mut tasks: Vec<Task<(), RetryExhaustedError>> = Vec::with_capacity(remainder.len());
    for item in remainder {
        let artifact = item
            .artifact_id
            .clone()
            .ok_or_else(|| missing_artifact(APPEND, item.id))?;
        let store = Arc::clone(&store);
        let user = ctx.user_id;
        let name = ctx.set_name.clone();
        let emojis = item.emojis.clone();
        let retry = RetryingOperation::new(format!("append sticker {}", item.id), policy.retry.clone());

        tasks.push(task(move || async move {
            retry
                .run(|| store.append_to_set(user, &name, &artifact, &emojis))
                .await
        }));
    }

    let appended = RateLimitedScheduler::new(APPEND, policy.batch.clone())
        .run(tasks)
        .await
        .map_err(|e| batch_failure(APPEND, e))?;

    ctx.appended = appended.len();
    Ok(ctx)
}
