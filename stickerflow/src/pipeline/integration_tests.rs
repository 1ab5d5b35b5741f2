//! End-to-end pipeline runs against in-process fakes.

#[cfg(test)]
mod tests {
    use crate::config::PipelineConfig;
    use crate::core::{ArtifactId, ItemId, PipelineState, UserId};
    use crate::errors::{StickerflowError, TransientRemoteError, ValidationError};
    use crate::pipeline::StickerPipeline;
    use crate::ports::{MockProgressSink, PipelinePorts};
    use crate::spec_source::JsonSpecSource;
    use crate::testing::{
        sample_spec, sample_url, FakeArtifactStore, FakeFetcher, RecordingCache, StaticSpecSource,
        TestHarness,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const USER: UserId = UserId(1001);

    fn pipeline(harness: &TestHarness) -> StickerPipeline {
        StickerPipeline::new(harness.ports(), PipelineConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_items_skip_download_and_upload() {
        let harness = TestHarness::new(sample_spec(3))
            .with_cache(RecordingCache::seeded([(1, "cached-1"), (2, "cached-2")]));

        let summary = assert_ok!(pipeline(&harness).run(USER, "doc").await);

        assert_eq!(harness.fetcher.calls(), vec![sample_url(3)]);
        assert_eq!(harness.normalizer.call_count(), 1);
        assert_eq!(harness.store.upload_calls(), 1);

        let expected: BTreeMap<_, _> = [(ItemId(3), ArtifactId::from("artifact-1"))]
            .into_iter()
            .collect();
        assert_eq!(harness.cache.writes(), vec![expected]);

        let created = harness.store.created_sets();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].first, ArtifactId::from("cached-1"));
        assert_eq!(created[0].user, USER);
        assert_eq!(harness.store.appended().len(), 2);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.reused, 2);
        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.appended, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_item_skips_append() {
        let harness = TestHarness::new(sample_spec(1));

        let summary = assert_ok!(pipeline(&harness).run(USER, "doc").await);

        assert_eq!(harness.store.create_calls(), 1);
        assert_eq!(harness.store.append_calls(), 0);
        assert_eq!(summary.appended, 0);
        assert_eq!(summary.states.last(), Some(&PipelineState::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_visits_every_state_in_order() {
        let harness = TestHarness::new(sample_spec(2));

        let summary = assert_ok!(pipeline(&harness).run(USER, "doc").await);

        assert_eq!(
            summary.states,
            vec![
                PipelineState::Received,
                PipelineState::SpecFetched,
                PipelineState::Partitioned,
                PipelineState::Downloaded,
                PipelineState::Processed,
                PipelineState::Uploaded,
                PipelineState::CachePersisted,
                PipelineState::SetCreated,
                PipelineState::Completed,
            ]
        );
        assert!(summary.finished_at >= summary.started_at);
        assert_eq!(summary.set_name, "pack_42_by_stickerflow_bot");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_field_fails_before_any_remote_call() {
        let harness = TestHarness::new(sample_spec(1));
        let ports = PipelinePorts {
            specs: Arc::new(JsonSpecSource::new()),
            ..harness.ports()
        };
        let pipeline = StickerPipeline::new(ports, PipelineConfig::default());
        let document = r#"{"id":1,"name":"n","author":{"name":"a"}}"#;

        let err = assert_err!(pipeline.run(USER, document).await);

        let StickerflowError::Validation(ValidationError { field, .. }) = &err else {
            panic!("expected a validation error, got {err:?}");
        };
        assert_eq!(field.as_deref(), Some("stickers"));
        assert_eq!(harness.fetcher.call_count(), 0);
        assert_eq!(harness.cache.read_count(), 0);
        assert!(harness.cache.writes().is_empty());
        assert_eq!(harness.store.total_calls(), 0);

        assert_eq!(harness.progress.last(), Some(err.user_message()));
        assert!(!pipeline.gate().is_active(&USER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_run_is_rejected_without_touching_holder() {
        let harness = TestHarness::new(sample_spec(1));
        let pipeline = pipeline(&harness);
        assert!(pipeline.gate().try_acquire(USER));

        let err = assert_err!(pipeline.run(USER, "doc").await);

        assert!(matches!(err, StickerflowError::ConcurrentSession(_)));
        assert!(pipeline.gate().is_active(&USER));
        assert_eq!(harness.specs.call_count(), 0);
        assert_eq!(
            harness.progress.last(),
            Some(err.user_message())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_runs_for_one_user() {
        let harness = TestHarness::new(sample_spec(2))
            .with_fetcher(FakeFetcher::new().with_latency(Duration::from_millis(50)));
        let pipeline = pipeline(&harness);

        let (first, second) = tokio::join!(pipeline.run(USER, "doc"), pipeline.run(USER, "doc"));

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(StickerflowError::ConcurrentSession(_)))));
        assert_eq!(harness.specs.call_count(), 1);
        assert!(!pipeline.gate().is_active(&USER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_users_run_side_by_side() {
        let harness = TestHarness::new(sample_spec(1))
            .with_fetcher(FakeFetcher::new().with_latency(Duration::from_millis(50)));
        let pipeline = pipeline(&harness);

        let (a, b) = tokio::join!(pipeline.run(UserId(1), "doc"), pipeline.run(UserId(2), "doc"));

        assert_ok!(a);
        assert_ok!(b);
        assert_eq!(harness.store.create_calls(), 2);
        assert_eq!(pipeline.gate().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_fails_run_and_releases_gate() {
        let harness = TestHarness::new(sample_spec(1))
            .with_store(FakeArtifactStore::new().always_failing_uploads());
        let pipeline = pipeline(&harness);

        let err = assert_err!(pipeline.run(USER, "doc").await);

        let StickerflowError::Stage(stage) = &err else {
            panic!("expected a stage error, got {err:?}");
        };
        assert_eq!(stage.stage, "upload");
        assert!(err.is_fault());
        assert!(!err.user_message().contains("injected"));

        assert_eq!(harness.store.upload_calls(), 3);
        assert_eq!(harness.store.create_calls(), 0);
        assert!(harness.cache.writes().is_empty());
        assert!(!pipeline.gate().is_active(&USER));

        // the gate is reusable afterwards
        assert!(pipeline.gate().try_acquire(USER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_faults_are_retried_within_run() {
        let harness = TestHarness::new(sample_spec(2))
            .with_fetcher(FakeFetcher::new().failing_first(sample_url(2), 2))
            .with_store(FakeArtifactStore::new().failing_uploads(1).failing_appends(4));

        let summary = assert_ok!(pipeline(&harness).run(USER, "doc").await);

        assert_eq!(harness.fetcher.call_count(), 4);
        assert_eq!(harness.store.upload_calls(), 3);
        assert_eq!(harness.store.append_calls(), 5);
        assert_eq!(summary.appended, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_exhaustion_fails_after_set_created() {
        let harness = TestHarness::new(sample_spec(2))
            .with_store(FakeArtifactStore::new().always_failing_appends());
        let pipeline = pipeline(&harness);

        let err = assert_err!(pipeline.run(USER, "doc").await);

        assert!(matches!(&err, StickerflowError::Stage(s) if s.stage == "append"));
        assert_eq!(harness.store.create_calls(), 1);
        assert_eq!(harness.store.append_calls(), 5);
        // ids obtained before the failure stay cached for the next run
        assert_eq!(harness.cache.writes().len(), 1);
        assert!(!pipeline.gate().is_active(&USER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_set_is_not_retried_by_default() {
        let harness = TestHarness::new(sample_spec(2))
            .with_store(FakeArtifactStore::new().failing_create(1));
        let pipeline = pipeline(&harness);

        let err = assert_err!(pipeline.run(USER, "doc").await);

        assert!(matches!(&err, StickerflowError::Stage(s) if s.stage == "create set"));
        assert_eq!(harness.store.create_calls(), 1);
        assert_eq!(harness.store.append_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_reuses_everything() {
        let harness = TestHarness::new(sample_spec(3));
        let pipeline = pipeline(&harness);

        assert_ok!(pipeline.run(USER, "doc").await);
        let summary = assert_ok!(pipeline.run(USER, "doc").await);

        assert_eq!(summary.reused, 3);
        assert_eq!(summary.uploaded, 0);
        assert_eq!(harness.store.upload_calls(), 3);
        // the second run had nothing fresh to persist
        assert_eq!(harness.cache.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spec_fetch_fault_is_generic() {
        let harness = TestHarness::new(sample_spec(1)).with_specs(StaticSpecSource::failing(
            TransientRemoteError::new("fetch spec", "connection refused"),
        ));

        let err = assert_err!(pipeline(&harness).run(USER, "doc").await);

        assert!(matches!(err, StickerflowError::TransientRemote(_)));
        assert!(!err.user_message().contains("connection refused"));
        assert_eq!(harness.cache.read_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_failures_are_not_fatal() {
        let harness = TestHarness::new(sample_spec(2));
        let mut progress = MockProgressSink::new();
        progress
            .expect_notify()
            .returning(|_, _| Err(TransientRemoteError::new("notify", "chat unavailable")));
        let ports = harness.ports().with_progress(Arc::new(progress));

        let pipeline = StickerPipeline::new(ports, PipelineConfig::default());
        let summary = assert_ok!(pipeline.run(USER, "doc").await);

        assert_eq!(summary.appended, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_message_links_to_set() {
        let harness = TestHarness::new(sample_spec(1));

        let summary = assert_ok!(pipeline(&harness).run(USER, "doc").await);

        let messages = harness.progress.messages_for(USER);
        assert!(messages.len() >= 3);
        assert_eq!(
            messages.last().map(String::as_str),
            Some(format!("Done! Your sticker set is ready: {}", summary.set_link()).as_str())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_images_upload_once() {
        let fetcher = FakeFetcher::new()
            .with_payload(sample_url(1), b"same".to_vec())
            .with_payload(sample_url(2), b"same".to_vec())
            .with_payload(sample_url(3), b"other".to_vec());
        let harness = TestHarness::new(sample_spec(3)).with_fetcher(fetcher);

        let summary = assert_ok!(pipeline(&harness).run(USER, "doc").await);

        assert_eq!(harness.store.upload_calls(), 2);
        assert_eq!(summary.deduplicated, 1);
        assert_eq!(summary.uploaded, 3);
        let written = &harness.cache.writes()[0];
        assert_eq!(written.get(&ItemId(1)), written.get(&ItemId(2)));
    }
}
