use crate::assets::{AssetCriteria, AssetRecord, AssetType};
use crate::error::Result;
use crate::job::{ProductionJob, StageId};
use crate::pipeline::{StageArtifact, StageContext, StageHandler};
use async_trait::async_trait;
use tracing::info;

/// Background lookups have no dialogue to compare, so the ceiling is the
/// scene + shot weights; the acceptance bar matches that ceiling.
const BACKGROUND_MIN_SCORE: f64 = 0.5;

const BACKGROUND_SHOT_TYPE: &str = "wide";

/// Background video stage: the establishing/intro-outro wide clip behind
/// the presenters.
pub struct BackgroundVideoStage;

#[async_trait]
impl StageHandler for BackgroundVideoStage {
    fn stage_id(&self) -> StageId {
        StageId::BackgroundVideo
    }

    async fn execute(&self, job: &ProductionJob, ctx: &StageContext) -> Result<StageArtifact> {
        let criteria = AssetCriteria {
            dialogue_text: None,
            scene_type: Some(ctx.config.background_scene_type.clone()),
            shot_type: Some(BACKGROUND_SHOT_TYPE.to_string()),
            min_similarity: BACKGROUND_MIN_SCORE,
        };

        let matches = ctx
            .assets
            .find_similar_assets(&job.channel_id, AssetType::Video, &criteria)
            .await?;

        let url = if let Some(best) = matches.first() {
            info!(
                job_id = %job.id,
                asset_id = %best.asset.id,
                reason = %best.match_reason,
                "reusing background video"
            );
            ctx.assets.record_reuse(&job.channel_id, best.asset.id).await?;
            best.asset.url.clone()
        } else {
            let prompt = format!(
                "{} studio, {}, {} shot, {} {}, no people, loopable",
                ctx.config.topic,
                ctx.config.background_scene_type,
                BACKGROUND_SHOT_TYPE,
                ctx.config.resolution,
                ctx.config.aspect_ratio
            );
            let key = ctx.fingerprints.video_key(&prompt);
            ctx.cache
                .get_or_generate(
                    &key,
                    ctx.config.media_ttl(),
                    ctx.config.video_cost,
                    || async {
                        let url = ctx.generator.generate_video(&prompt).await?;
                        let record = AssetRecord::new(AssetType::Video, &url, &job.channel_id)
                            .with_production(job.id)
                            .with_scene(&ctx.config.background_scene_type)
                            .with_shot(BACKGROUND_SHOT_TYPE)
                            .with_format(&ctx.config.resolution, &ctx.config.aspect_ratio);
                        ctx.assets.register_asset(&record).await?;
                        Ok(url)
                    },
                )
                .await?
        };

        info!(job_id = %job.id, "background video ready");
        Ok(StageArtifact::BackgroundVideo { urls: vec![url] })
    }
}
