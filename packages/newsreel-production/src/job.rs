use crate::error::{ProductionError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Stage identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageId {
    Script,
    SegmentAudio,
    SegmentVideo,
    BackgroundVideo,
    Metadata,
    Merge,
    Thumbnail,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Script => "script",
            StageId::SegmentAudio => "segment_audio",
            StageId::SegmentVideo => "segment_video",
            StageId::BackgroundVideo => "background_video",
            StageId::Metadata => "metadata",
            StageId::Merge => "merge",
            StageId::Thumbnail => "thumbnail",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "script" => Ok(StageId::Script),
            "segment_audio" => Ok(StageId::SegmentAudio),
            "segment_video" => Ok(StageId::SegmentVideo),
            "background_video" => Ok(StageId::BackgroundVideo),
            "metadata" => Ok(StageId::Metadata),
            "merge" => Ok(StageId::Merge),
            "thumbnail" => Ok(StageId::Thumbnail),
            _ => Err(ProductionError::parse(format!("Invalid stage ID: {}", s))),
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse job status for persistence and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Draft,
    InProgress,
    Completed,
    Failed,
}

/// Job state enum; every legal move between states goes through
/// [`transition`], so illegal moves (Completed -> MediaGenerating)
/// are unrepresentable in a checkpointed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobState {
    Created,
    ScriptPending {
        since: DateTime<Utc>,
    },
    ScriptReady {
        since: DateTime<Utc>,
    },
    MediaGenerating {
        since: DateTime<Utc>,
    },
    MediaReady {
        since: DateTime<Utc>,
    },
    ThumbnailPending {
        since: DateTime<Utc>,
    },
    Completed {
        completed_at: DateTime<Utc>,
    },
    Failed {
        failed_at: DateTime<Utc>,
        failed_stage: StageId,
        error: String,
    },
}

impl JobState {
    pub fn state_name(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::ScriptPending { .. } => "script_pending",
            JobState::ScriptReady { .. } => "script_ready",
            JobState::MediaGenerating { .. } => "media_generating",
            JobState::MediaReady { .. } => "media_ready",
            JobState::ThumbnailPending { .. } => "thumbnail_pending",
            JobState::Completed { .. } => "completed",
            JobState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed { .. } | JobState::Failed { .. })
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Created => JobStatus::Draft,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
            _ => JobStatus::InProgress,
        }
    }
}

/// Events that drive the job state machine
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    ScriptRequested,
    ScriptProduced,
    MediaRequested,
    MediaProduced,
    ThumbnailRequested,
    ThumbnailProduced,
    StageFailed { stage: StageId, error: String },
    Resumed,
    RegenerationRequested,
}

impl JobEvent {
    fn target_name(&self) -> &'static str {
        match self {
            JobEvent::ScriptRequested => "script_pending",
            JobEvent::ScriptProduced => "script_ready",
            JobEvent::MediaRequested => "media_generating",
            JobEvent::MediaProduced => "media_ready",
            JobEvent::ThumbnailRequested => "thumbnail_pending",
            JobEvent::ThumbnailProduced => "completed",
            JobEvent::StageFailed { .. } => "failed",
            JobEvent::Resumed | JobEvent::RegenerationRequested => "created",
        }
    }
}

/// Pure transition function: `(state, event) -> state`.
///
/// `ScriptProduced` is accepted from Created as well as ScriptPending:
/// a job resuming with a persisted script skips ScriptPending entirely.
/// `Resumed` re-enters the stage walk from Created, from Failed or from
/// any in-flight state left behind by an interrupted process; artifacts
/// on the job make completed stages no-ops, so no per-stage re-entry
/// state is needed.
pub fn transition(state: &JobState, event: &JobEvent, now: DateTime<Utc>) -> Result<JobState> {
    let next = match (state, event) {
        (JobState::Created, JobEvent::ScriptRequested) => {
            Some(JobState::ScriptPending { since: now })
        }
        (JobState::Created | JobState::ScriptPending { .. }, JobEvent::ScriptProduced) => {
            Some(JobState::ScriptReady { since: now })
        }
        (JobState::ScriptReady { .. }, JobEvent::MediaRequested) => {
            Some(JobState::MediaGenerating { since: now })
        }
        (JobState::MediaGenerating { .. }, JobEvent::MediaProduced) => {
            Some(JobState::MediaReady { since: now })
        }
        (JobState::MediaReady { .. }, JobEvent::ThumbnailRequested) => {
            Some(JobState::ThumbnailPending { since: now })
        }
        (JobState::ThumbnailPending { .. }, JobEvent::ThumbnailProduced) => {
            Some(JobState::Completed { completed_at: now })
        }
        (state, JobEvent::StageFailed { stage, error }) if !state.is_terminal() => {
            Some(JobState::Failed {
                failed_at: now,
                failed_stage: *stage,
                error: error.clone(),
            })
        }
        (
            JobState::ScriptPending { .. }
            | JobState::ScriptReady { .. }
            | JobState::MediaGenerating { .. }
            | JobState::MediaReady { .. }
            | JobState::ThumbnailPending { .. }
            | JobState::Failed { .. },
            JobEvent::Resumed,
        ) => Some(JobState::Created),
        (
            JobState::Completed { .. } | JobState::Failed { .. },
            JobEvent::RegenerationRequested,
        ) => Some(JobState::Created),
        _ => None,
    };

    next.ok_or_else(|| ProductionError::InvalidStateTransition {
        from: state.state_name().to_string(),
        to: event.target_name().to_string(),
    })
}

/// One line of the production script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLine {
    pub speaker: String,
    pub text: String,
}

impl ScriptLine {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}

/// Title/description/tags for publishing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViralMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// A finished segment: one script line paired with its media.
/// Video is optional; a segment without video is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub speaker: String,
    pub text: String,
    pub audio_ref: String,
    pub video_ref: Option<String>,
}

/// Video URL collections on the finished job: background/wide clips plus
/// ordered per-role (per-presenter) lists, deduplicated by URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoAssets {
    pub wide: Vec<String>,
    pub per_role: BTreeMap<String, Vec<String>>,
}

impl VideoAssets {
    /// Append preserving first-seen order; duplicate URLs are dropped.
    pub fn push_role(&mut self, role: &str, url: &str) {
        let urls = self.per_role.entry(role.to_string()).or_default();
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }

    pub fn push_wide(&mut self, url: &str) {
        if !self.wide.iter().any(|u| u == url) {
            self.wide.push(url.to_string());
        }
    }
}

/// A selected source item submitted by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    pub id: String,
    pub title: String,
    pub summary: String,
}

impl SourceItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: summary.into(),
        }
    }
}

/// Production job model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionJob {
    pub id: Uuid,
    pub channel_id: String,
    pub user_id: String,
    pub date_key: String,
    pub state: JobState,
    /// Monotonic count of completed stages; reset only by explicit
    /// full regeneration.
    pub current_step: u32,
    pub selected_item_ids: BTreeSet<String>,
    pub script: Vec<ScriptLine>,
    pub viral_hook: Option<String>,
    pub viral_metadata: Option<ViralMetadata>,
    pub segments: Vec<Segment>,
    pub video_assets: VideoAssets,
    pub thumbnail_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProductionJob {
    pub fn new(
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        date_key: impl Into<String>,
        selected_item_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            date_key: date_key.into(),
            state: JobState::Created,
            current_step: 0,
            selected_item_ids: selected_item_ids.into_iter().collect(),
            script: Vec::new(),
            viral_hook: None,
            viral_metadata: None,
            segments: Vec::new(),
            video_assets: VideoAssets::default(),
            thumbnail_urls: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn has_script(&self) -> bool {
        !self.script.is_empty()
    }

    pub fn has_segments(&self) -> bool {
        !self.segments.is_empty() && self.segments.len() == self.script.len()
    }

    pub fn has_thumbnails(&self) -> bool {
        !self.thumbnail_urls.is_empty()
    }
}

/// Job state machine wrapper: applies events through [`transition`] and
/// keeps the bookkeeping fields consistent.
pub struct JobStateMachine {
    job: ProductionJob,
}

impl JobStateMachine {
    pub fn new(job: ProductionJob) -> Self {
        Self { job }
    }

    pub fn job(&self) -> &ProductionJob {
        &self.job
    }

    pub fn job_mut(&mut self) -> &mut ProductionJob {
        &mut self.job
    }

    pub fn into_job(self) -> ProductionJob {
        self.job
    }

    pub fn apply(&mut self, event: JobEvent) -> Result<()> {
        let now = Utc::now();
        self.job.state = transition(&self.job.state, &event, now)?;
        self.job.updated_at = now;

        match event {
            JobEvent::ThumbnailProduced => {
                self.job.completed_at = Some(now);
            }
            JobEvent::RegenerationRequested => {
                // Full regeneration discards stage artifacts and the
                // step counter; the job identity and selection remain.
                self.job.current_step = 0;
                self.job.script.clear();
                self.job.viral_hook = None;
                self.job.viral_metadata = None;
                self.job.segments.clear();
                self.job.video_assets = VideoAssets::default();
                self.job.thumbnail_urls.clear();
                self.job.completed_at = None;
            }
            _ => {}
        }
        Ok(())
    }
}
