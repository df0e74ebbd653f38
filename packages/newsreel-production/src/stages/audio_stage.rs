use crate::assets::{AssetRecord, AssetType};
use crate::error::Result;
use crate::job::{ProductionJob, StageId};
use crate::pipeline::{AudioTrack, StageArtifact, StageContext, StageHandler};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Cache payload for one synthesized line; keyed by (voice, text) so the
/// same words in the same voice are never billed twice across jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAudio {
    url: String,
    duration_secs: f64,
}

/// Segment audio stage: one narration track per script line.
pub struct SegmentAudioStage;

#[async_trait]
impl StageHandler for SegmentAudioStage {
    fn stage_id(&self) -> StageId {
        StageId::SegmentAudio
    }

    async fn execute(&self, job: &ProductionJob, ctx: &StageContext) -> Result<StageArtifact> {
        let mut tracks = Vec::with_capacity(job.script.len());

        for (index, line) in job.script.iter().enumerate() {
            let voice = ctx.config.voice_for(&line.speaker).to_string();
            let key = ctx.fingerprints.audio_key(&voice, &line.text);

            let cached: CachedAudio = ctx
                .cache
                .get_or_generate(
                    &key,
                    ctx.config.media_ttl(),
                    ctx.config.audio_cost,
                    || async {
                        let audio = ctx.generator.generate_audio(line, &voice).await?;
                        let path = format!(
                            "audio/{}/{}/segment-{:02}.mp3",
                            job.channel_id, job.id, index
                        );
                        let url = ctx.blobs.upload(&audio.bytes, &path).await?;

                        let mut record =
                            AssetRecord::new(AssetType::Audio, &url, &job.channel_id)
                                .with_production(job.id)
                                .with_dialogue(&line.text);
                        record.duration_secs = Some(audio.duration_secs);
                        ctx.assets.register_asset(&record).await?;

                        Ok(CachedAudio {
                            url,
                            duration_secs: audio.duration_secs,
                        })
                    },
                )
                .await?;

            tracks.push(AudioTrack {
                index,
                url: cached.url,
                duration_secs: cached.duration_secs,
            });
        }

        info!(job_id = %job.id, tracks = tracks.len(), "segment audio ready");
        Ok(StageArtifact::SegmentAudio { tracks })
    }
}
