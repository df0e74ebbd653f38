use crate::assets::{AssetCriteria, AssetRecord, AssetType};
use crate::config::ProductionConfig;
use crate::error::Result;
use crate::job::{ProductionJob, ScriptLine, StageId};
use crate::pipeline::{SegmentClip, StageArtifact, StageContext, StageHandler};
use async_trait::async_trait;
use tracing::info;

fn clip_prompt(line: &ScriptLine, config: &ProductionConfig) -> String {
    format!(
        "{} presenter at a {}, {}, {} {}, speaking: {}",
        config.topic,
        config.dialogue_scene_type,
        config.dialogue_shot_type,
        config.resolution,
        config.aspect_ratio,
        line.text
    )
}

/// Segment video stage: a presenter clip per script line, reusing a
/// similar prior asset when one scores high enough.
pub struct SegmentVideoStage;

#[async_trait]
impl StageHandler for SegmentVideoStage {
    fn stage_id(&self) -> StageId {
        StageId::SegmentVideo
    }

    async fn execute(&self, job: &ProductionJob, ctx: &StageContext) -> Result<StageArtifact> {
        let mut clips = Vec::with_capacity(job.script.len());
        let mut reused = 0usize;

        for (index, line) in job.script.iter().enumerate() {
            let criteria = AssetCriteria {
                dialogue_text: Some(line.text.clone()),
                scene_type: Some(ctx.config.dialogue_scene_type.clone()),
                shot_type: Some(ctx.config.dialogue_shot_type.clone()),
                min_similarity: ctx.config.min_asset_similarity,
            };

            let matches = ctx
                .assets
                .find_similar_assets(&job.channel_id, AssetType::Video, &criteria)
                .await?;

            let url = if let Some(best) = matches.first() {
                info!(
                    job_id = %job.id,
                    index,
                    asset_id = %best.asset.id,
                    score = best.score,
                    reason = %best.match_reason,
                    "reusing segment video"
                );
                ctx.assets.record_reuse(&job.channel_id, best.asset.id).await?;
                reused += 1;
                best.asset.url.clone()
            } else {
                let prompt = clip_prompt(line, &ctx.config);
                let key = ctx.fingerprints.video_key(&prompt);
                ctx.cache
                    .get_or_generate(
                        &key,
                        ctx.config.media_ttl(),
                        ctx.config.video_cost,
                        || async {
                            let url = ctx.generator.generate_video(&prompt).await?;
                            let record =
                                AssetRecord::new(AssetType::Video, &url, &job.channel_id)
                                    .with_production(job.id)
                                    .with_dialogue(&line.text)
                                    .with_scene(&ctx.config.dialogue_scene_type)
                                    .with_shot(&ctx.config.dialogue_shot_type)
                                    .with_format(
                                        &ctx.config.resolution,
                                        &ctx.config.aspect_ratio,
                                    );
                            ctx.assets.register_asset(&record).await?;
                            Ok(url)
                        },
                    )
                    .await?
            };

            clips.push(SegmentClip {
                index,
                speaker: line.speaker.clone(),
                url,
            });
        }

        info!(
            job_id = %job.id,
            clips = clips.len(),
            reused,
            "segment video ready"
        );
        Ok(StageArtifact::SegmentVideo { clips })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_prompt_carries_framing_and_dialogue() {
        let config = ProductionConfig::default().with_topic("finance");
        let line = ScriptLine::new("anchor", "Markets rallied.");

        let prompt = clip_prompt(&line, &config);
        assert!(prompt.contains("finance"));
        assert!(prompt.contains("news_desk"));
        assert!(prompt.contains("Markets rallied."));
    }
}
