use crate::error::{ProductionError, Result};
use crate::job::{ProductionJob, Segment, StageId, VideoAssets};
use crate::pipeline::{StageArtifact, StageContext, StageHandler};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{info, warn};

/// Merge stage: pair every script line's audio with the clip generated
/// for the same index and assemble the job's video asset lists.
///
/// Audio is mandatory per segment; video is attached only if present.
pub struct MergeStage;

#[async_trait]
impl StageHandler for MergeStage {
    fn stage_id(&self) -> StageId {
        StageId::Merge
    }

    fn is_complete(&self, job: &ProductionJob) -> bool {
        job.has_segments()
    }

    async fn execute(&self, job: &ProductionJob, ctx: &StageContext) -> Result<StageArtifact> {
        let tracks = match ctx.stage_artifact(job, StageId::SegmentAudio).await? {
            Some(StageArtifact::SegmentAudio { tracks }) => tracks,
            _ => return Err(ProductionError::MissingArtifact(StageId::SegmentAudio)),
        };

        let clips = match ctx.stage_artifact(job, StageId::SegmentVideo).await? {
            Some(StageArtifact::SegmentVideo { clips }) => clips,
            _ => {
                warn!(job_id = %job.id, "no segment video artifact, merging audio-only");
                Vec::new()
            }
        };

        let background = match ctx.stage_artifact(job, StageId::BackgroundVideo).await? {
            Some(StageArtifact::BackgroundVideo { urls }) => urls,
            _ => {
                warn!(job_id = %job.id, "no background video artifact");
                Vec::new()
            }
        };

        let audio_by_index: HashMap<usize, _> =
            tracks.into_iter().map(|t| (t.index, t)).collect();
        let clip_by_index: HashMap<usize, _> =
            clips.iter().cloned().map(|c| (c.index, c)).collect();

        let mut segments = Vec::with_capacity(job.script.len());
        for (index, line) in job.script.iter().enumerate() {
            let track = audio_by_index.get(&index).ok_or_else(|| {
                ProductionError::Generation(format!("no audio track for segment {}", index))
            })?;

            segments.push(Segment {
                speaker: line.speaker.clone(),
                text: line.text.clone(),
                audio_ref: track.url.clone(),
                video_ref: clip_by_index.get(&index).map(|c| c.url.clone()),
            });
        }

        let mut video_assets = VideoAssets::default();
        for url in &background {
            video_assets.push_wide(url);
        }
        // Role lists follow segment order; push_role drops duplicate URLs.
        let mut ordered = clips;
        ordered.sort_by_key(|c| c.index);
        for clip in &ordered {
            video_assets.push_role(&clip.speaker, &clip.url);
        }

        info!(
            job_id = %job.id,
            segments = segments.len(),
            roles = video_assets.per_role.len(),
            "segments merged"
        );
        Ok(StageArtifact::Merge {
            segments,
            video_assets,
        })
    }
}
