//! End-to-end pipeline tests: full runs, crash/resume, fan-out failure
//! isolation, and cross-job reuse through the cache and asset index.

use async_trait::async_trait;
use newsreel_production::{
    AssetSimilarityIndex, AssetType, BlobStore, CheckpointManager, ContentCache, GeneratedAudio,
    Generator, JobStatus, PipelineController, ProductionConfig, ProductionError, ProductionJob,
    Result, ScriptLine, SourceItem, StageId, ViralMetadata,
};
use newsreel_storage::MemoryRecordStore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("newsreel_production=debug")
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct MockGenerator {
    fail_audio: AtomicBool,
    script_calls: AtomicUsize,
    hook_calls: AtomicUsize,
    audio_calls: AtomicUsize,
    video_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
    thumbnail_calls: AtomicUsize,
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate_script(
        &self,
        selection: &[SourceItem],
        _config: &ProductionConfig,
        hook: &str,
    ) -> Result<Vec<ScriptLine>> {
        self.script_calls.fetch_add(1, Ordering::SeqCst);
        let mut lines = vec![ScriptLine::new("anchor", format!("Tonight: {}", hook))];
        for item in selection {
            lines.push(ScriptLine::new("analyst", format!("More on {}.", item.title)));
        }
        Ok(lines)
    }

    async fn generate_hook(
        &self,
        selection: &[SourceItem],
        _config: &ProductionConfig,
    ) -> Result<String> {
        let take = self.hook_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            "{} stories you cannot miss (take {})",
            selection.len(),
            take
        ))
    }

    async fn generate_audio(&self, line: &ScriptLine, _voice_id: &str) -> Result<GeneratedAudio> {
        if self.fail_audio.load(Ordering::SeqCst) {
            return Err(ProductionError::Generation("tts quota exhausted".into()));
        }
        self.audio_calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedAudio {
            bytes: line.text.as_bytes().to_vec(),
            duration_secs: 3.5,
        })
    }

    async fn generate_video(&self, _prompt: &str) -> Result<String> {
        let n = self.video_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("gs://videos/clip-{}.mp4", n))
    }

    async fn generate_metadata(
        &self,
        _selection: &[SourceItem],
        _config: &ProductionConfig,
        date_key: &str,
    ) -> Result<ViralMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ViralMetadata {
            title: format!("Daily briefing {}", date_key),
            description: "Everything that happened today.".to_string(),
            tags: vec!["news".to_string(), "daily".to_string()],
        })
    }

    async fn generate_thumbnail(&self, title: &str, _config: &ProductionConfig) -> Result<String> {
        let n = self.thumbnail_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("gs://thumbs/{}-{}.png", title.len(), n))
    }
}

struct MockBlobStore;

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn upload(&self, _bytes: &[u8], path: &str) -> Result<String> {
        Ok(format!("blob://{}", path))
    }

    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _paths: &[String]) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    controller: PipelineController,
    generator: Arc<MockGenerator>,
    assets: Arc<AssetSimilarityIndex>,
    checkpoints: Arc<CheckpointManager>,
}

const CHANNEL: &str = "channel-1";

fn harness() -> Harness {
    init_tracing();
    let store = Arc::new(MemoryRecordStore::new());
    let cache = Arc::new(ContentCache::new(CHANNEL, store.clone()));
    let assets = Arc::new(AssetSimilarityIndex::new(store.clone()));
    let checkpoints = Arc::new(CheckpointManager::new(store));
    let generator = Arc::new(MockGenerator::default());

    let controller = PipelineController::new(
        cache,
        assets.clone(),
        checkpoints.clone(),
        generator.clone(),
        Arc::new(MockBlobStore),
        ProductionConfig::default()
            .with_voice("anchor", "voice-anchor")
            .with_voice("analyst", "voice-analyst"),
    )
    .unwrap();

    Harness {
        controller,
        generator,
        assets,
        checkpoints,
    }
}

fn selection() -> Vec<SourceItem> {
    vec![
        SourceItem::new(
            "story-fusion",
            "Fusion breakthrough at the national lab",
            "Researchers sustained ignition for a full minute.",
        ),
        SourceItem::new(
            "story-transit",
            "Transit strike ends downtown",
            "Trains resume service after a week of gridlock.",
        ),
    ]
}

fn new_job() -> ProductionJob {
    ProductionJob::new(CHANNEL, "user-1", "2026-08-04", Vec::<String>::new())
}

#[tokio::test]
async fn test_full_run_completes_with_aligned_segments() {
    let h = harness();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let controller = h.controller.with_progress(tx);

    let job = controller
        .start_or_resume(new_job(), selection())
        .await
        .unwrap();

    assert_eq!(job.status(), JobStatus::Completed);
    assert!(job.completed_at.is_some());
    assert_eq!(job.current_step, 7);

    // 1 anchor line + 1 analyst line per story.
    assert_eq!(job.script.len(), 3);
    assert_eq!(job.segments.len(), job.script.len());
    for segment in &job.segments {
        assert!(segment.audio_ref.starts_with("blob://audio/"));
        assert!(segment.video_ref.is_some());
    }

    assert!(job.viral_hook.as_deref().unwrap().contains("take 1"));
    assert!(job
        .viral_metadata
        .as_ref()
        .unwrap()
        .title
        .contains("2026-08-04"));
    assert_eq!(job.thumbnail_urls.len(), 2);
    assert!(!job.video_assets.wide.is_empty());
    assert!(job.video_assets.per_role.contains_key("anchor"));
    assert!(job.video_assets.per_role.contains_key("analyst"));

    // One progress event per stage, bounded by the stage count.
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 7);
    assert!(events.iter().all(|e| e.step_count == 7));
    assert_eq!(events.last().unwrap().step_index, 7);

    // Stage intermediates are cleaned up once the job completes; the
    // snapshot remains.
    assert!(h
        .checkpoints
        .completed_stages(CHANNEL, job.id)
        .await
        .unwrap()
        .is_empty());
    let snapshot = h
        .checkpoints
        .load_job(CHANNEL, job.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.status(), JobStatus::Completed);
}

#[tokio::test]
async fn test_fanout_failure_isolation_and_artifact_retention() {
    let h = harness();
    h.generator.fail_audio.store(true, Ordering::SeqCst);

    let job = h
        .controller
        .start_or_resume(new_job(), selection())
        .await
        .unwrap();

    // Audio failed, so the job can never be Completed even though the
    // three sibling tasks succeeded.
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.segments.is_empty());
    assert!(job.thumbnail_urls.is_empty());

    match &job.state {
        newsreel_production::JobState::Failed {
            failed_stage,
            error,
            ..
        } => {
            assert_eq!(*failed_stage, StageId::SegmentAudio);
            assert!(error.contains("tts quota exhausted"));
        }
        other => panic!("expected Failed state, got {:?}", other),
    }

    // Successful siblings checkpointed before the failure surfaced.
    let completed = h
        .checkpoints
        .completed_stages(CHANNEL, job.id)
        .await
        .unwrap();
    assert!(completed.contains(&StageId::Script));
    assert!(completed.contains(&StageId::SegmentVideo));
    assert!(completed.contains(&StageId::BackgroundVideo));
    assert!(completed.contains(&StageId::Metadata));
    assert!(!completed.contains(&StageId::SegmentAudio));
}

#[tokio::test]
async fn test_resume_skips_completed_work_and_refreshes_hook() {
    let h = harness();

    // First attempt: audio generation is down, the job fails mid-fanout.
    h.generator.fail_audio.store(true, Ordering::SeqCst);
    let failed = h
        .controller
        .start_or_resume(new_job(), selection())
        .await
        .unwrap();
    assert_eq!(failed.status(), JobStatus::Failed);
    assert_eq!(h.generator.script_calls.load(Ordering::SeqCst), 1);
    let videos_after_first = h.generator.video_calls.load(Ordering::SeqCst);

    // Second attempt resumes from the checkpoint.
    h.generator.fail_audio.store(false, Ordering::SeqCst);
    let resumed = h
        .controller
        .resume_from_checkpoint(CHANNEL, failed.id, selection())
        .await
        .unwrap();

    assert_eq!(resumed.status(), JobStatus::Completed);
    assert_eq!(resumed.segments.len(), resumed.script.len());
    assert_eq!(resumed.current_step, 7);

    // Script generation ran once across both attempts; the hook was
    // regenerated on resume even though the script was reused.
    assert_eq!(h.generator.script_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.generator.hook_calls.load(Ordering::SeqCst), 2);
    assert!(resumed.viral_hook.as_deref().unwrap().contains("take 2"));

    // Video and metadata stages were checkpointed on the first attempt
    // and skipped on resume.
    assert_eq!(
        h.generator.video_calls.load(Ordering::SeqCst),
        videos_after_first
    );
    assert_eq!(h.generator.metadata_calls.load(Ordering::SeqCst), 1);

    // An uninterrupted run on a fresh harness yields the same shape.
    let reference = harness();
    let uninterrupted = reference
        .controller
        .start_or_resume(new_job(), selection())
        .await
        .unwrap();
    assert_eq!(uninterrupted.segments.len(), resumed.segments.len());
}

#[tokio::test]
async fn test_second_job_reuses_cached_and_indexed_artifacts() {
    let h = harness();

    let first = h
        .controller
        .start_or_resume(new_job(), selection())
        .await
        .unwrap();
    assert_eq!(first.status(), JobStatus::Completed);

    let script_calls = h.generator.script_calls.load(Ordering::SeqCst);
    let audio_calls = h.generator.audio_calls.load(Ordering::SeqCst);
    let video_calls = h.generator.video_calls.load(Ordering::SeqCst);

    let second = h
        .controller
        .start_or_resume(new_job(), selection())
        .await
        .unwrap();
    assert_eq!(second.status(), JobStatus::Completed);

    // Same selection, same channel: script and audio come from the
    // cache, clips come from the asset index.
    assert_eq!(h.generator.script_calls.load(Ordering::SeqCst), script_calls);
    assert_eq!(h.generator.audio_calls.load(Ordering::SeqCst), audio_calls);
    assert_eq!(h.generator.video_calls.load(Ordering::SeqCst), video_calls);

    // Reuse was recorded against the indexed clips.
    let popular = h
        .assets
        .popular_assets(CHANNEL, Some(AssetType::Video), 5)
        .await
        .unwrap();
    assert!(popular[0].use_count >= 1);
}

#[tokio::test]
async fn test_existing_thumbnails_skip_the_stage() {
    let h = harness();

    let mut job = new_job();
    job.thumbnail_urls = vec!["gs://thumbs/existing.png".to_string()];

    let finished = h
        .controller
        .start_or_resume(job, selection())
        .await
        .unwrap();

    assert_eq!(finished.status(), JobStatus::Completed);
    assert_eq!(
        finished.thumbnail_urls,
        vec!["gs://thumbs/existing.png".to_string()]
    );
    assert_eq!(h.generator.thumbnail_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_validation_rejects_bad_input_before_any_transition() {
    let h = harness();

    let err = h
        .controller
        .start_or_resume(new_job(), Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProductionError::Validation(_)));

    let mut wrong_channel = new_job();
    wrong_channel.channel_id = "channel-2".to_string();
    let err = h
        .controller
        .start_or_resume(wrong_channel, selection())
        .await
        .unwrap_err();
    assert!(matches!(err, ProductionError::Validation(_)));

    // Nothing was generated or persisted.
    assert_eq!(h.generator.hook_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_completed_job_is_returned_unchanged() {
    let h = harness();

    let finished = h
        .controller
        .start_or_resume(new_job(), selection())
        .await
        .unwrap();
    let thumbnail_calls = h.generator.thumbnail_calls.load(Ordering::SeqCst);

    let again = h
        .controller
        .start_or_resume(finished.clone(), selection())
        .await
        .unwrap();

    assert_eq!(again, finished);
    assert_eq!(
        h.generator.thumbnail_calls.load(Ordering::SeqCst),
        thumbnail_calls
    );
}

#[tokio::test]
async fn test_regeneration_resets_and_rebuilds() {
    let h = harness();

    let finished = h
        .controller
        .start_or_resume(new_job(), selection())
        .await
        .unwrap();
    let thumbnails_before = h.generator.thumbnail_calls.load(Ordering::SeqCst);
    let first_thumbs = finished.thumbnail_urls.clone();

    let regenerated = h
        .controller
        .regenerate(finished.clone(), selection())
        .await
        .unwrap();

    assert_eq!(regenerated.id, finished.id);
    assert_eq!(regenerated.status(), JobStatus::Completed);
    assert_eq!(regenerated.current_step, 7);

    // Thumbnails are not cached, so regeneration produced fresh ones.
    assert_eq!(
        h.generator.thumbnail_calls.load(Ordering::SeqCst),
        thumbnails_before + 2
    );
    assert_ne!(regenerated.thumbnail_urls, first_thumbs);

    // The script is still served from the content cache: regeneration
    // rebuilds artifacts, not the memoization underneath them.
    assert_eq!(h.generator.script_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resume_from_unknown_checkpoint_fails() {
    let h = harness();
    let err = h
        .controller
        .resume_from_checkpoint(CHANNEL, uuid::Uuid::new_v4(), selection())
        .await
        .unwrap_err();
    assert!(matches!(err, ProductionError::CheckpointNotFound(_)));
}

#[tokio::test]
async fn test_cancellation_fails_the_job() {
    let h = harness();
    let token = CancellationToken::new();
    let controller = h.controller.with_cancellation(token.clone());
    token.cancel();

    let job = controller
        .start_or_resume(new_job(), selection())
        .await
        .unwrap();

    assert_eq!(job.status(), JobStatus::Failed);
    match &job.state {
        newsreel_production::JobState::Failed { error, .. } => {
            assert!(error.to_lowercase().contains("cancelled"));
        }
        other => panic!("expected Failed state, got {:?}", other),
    }
}
