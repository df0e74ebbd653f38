//! Stage plumbing: the context handed to every stage, the artifact each
//! stage produces, and the handler trait the controller drives.

use crate::assets::AssetSimilarityIndex;
use crate::cache::ContentCache;
use crate::checkpoint::CheckpointManager;
use crate::config::ProductionConfig;
use crate::dag::Fingerprints;
use crate::error::Result;
use crate::job::{ProductionJob, ScriptLine, Segment, SourceItem, StageId, VideoAssets, ViralMetadata};
use crate::providers::{BlobStore, Generator};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Speech for one script line, by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub index: usize,
    pub url: String,
    pub duration_secs: f64,
}

/// Video clip for one script line, by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentClip {
    pub index: usize,
    pub speaker: String,
    pub url: String,
}

/// Output of one pipeline stage; checkpointed per (job, stage).
///
/// Script, Metadata, Merge and Thumbnail artifacts are reflected onto
/// the job record; the media artifacts stay in the artifact table until
/// the merge stage consumes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageArtifact {
    Script {
        lines: Vec<ScriptLine>,
        hook: String,
    },
    SegmentAudio {
        tracks: Vec<AudioTrack>,
    },
    SegmentVideo {
        clips: Vec<SegmentClip>,
    },
    BackgroundVideo {
        urls: Vec<String>,
    },
    Metadata {
        metadata: ViralMetadata,
    },
    Merge {
        segments: Vec<Segment>,
        video_assets: VideoAssets,
    },
    Thumbnail {
        urls: Vec<String>,
    },
}

impl StageArtifact {
    pub fn stage_id(&self) -> StageId {
        match self {
            StageArtifact::Script { .. } => StageId::Script,
            StageArtifact::SegmentAudio { .. } => StageId::SegmentAudio,
            StageArtifact::SegmentVideo { .. } => StageId::SegmentVideo,
            StageArtifact::BackgroundVideo { .. } => StageId::BackgroundVideo,
            StageArtifact::Metadata { .. } => StageId::Metadata,
            StageArtifact::Merge { .. } => StageId::Merge,
            StageArtifact::Thumbnail { .. } => StageId::Thumbnail,
        }
    }

    /// Reflect this artifact onto the job record.
    pub fn apply_to(&self, job: &mut ProductionJob) {
        match self {
            StageArtifact::Script { lines, hook } => {
                job.script = lines.clone();
                job.viral_hook = Some(hook.clone());
            }
            StageArtifact::Metadata { metadata } => {
                job.viral_metadata = Some(metadata.clone());
            }
            StageArtifact::Merge {
                segments,
                video_assets,
            } => {
                job.segments = segments.clone();
                job.video_assets = video_assets.clone();
            }
            StageArtifact::Thumbnail { urls } => {
                job.thumbnail_urls = urls.clone();
            }
            // Media intermediates are not job fields.
            StageArtifact::SegmentAudio { .. }
            | StageArtifact::SegmentVideo { .. }
            | StageArtifact::BackgroundVideo { .. } => {}
        }
    }
}

/// Shared services and per-run state handed to every stage.
#[derive(Clone)]
pub struct StageContext {
    pub fingerprints: Fingerprints,
    pub cache: Arc<ContentCache>,
    pub assets: Arc<AssetSimilarityIndex>,
    pub generator: Arc<dyn Generator>,
    pub blobs: Arc<dyn BlobStore>,
    pub checkpoints: Arc<CheckpointManager>,
    pub config: Arc<ProductionConfig>,
    pub selection: Arc<Vec<SourceItem>>,
    /// Artifacts produced earlier in this run; lets the merge stage read
    /// its inputs even when a checkpoint write failed.
    pub run_artifacts: Arc<DashMap<StageId, StageArtifact>>,
    pub cancel: CancellationToken,
}

impl StageContext {
    /// Dependency artifact lookup: current run first, then the durable
    /// artifact table (the resume path).
    pub async fn stage_artifact(
        &self,
        job: &ProductionJob,
        stage: StageId,
    ) -> Result<Option<StageArtifact>> {
        if let Some(artifact) = self.run_artifacts.get(&stage) {
            return Ok(Some(artifact.clone()));
        }
        self.checkpoints
            .load_stage_artifact(&job.channel_id, job.id, stage)
            .await
    }
}

/// Stage handler trait (pluggable stages)
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage_id(&self) -> StageId;

    /// Whether the job record already carries this stage's artifacts,
    /// making the stage a no-op on resume.
    fn is_complete(&self, _job: &ProductionJob) -> bool {
        false
    }

    async fn execute(&self, job: &ProductionJob, ctx: &StageContext) -> Result<StageArtifact>;
}

/// Emitted as stages complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step_index: usize,
    pub step_count: usize,
    pub label: String,
}

pub type ProgressSender = tokio::sync::mpsc::UnboundedSender<ProgressEvent>;
