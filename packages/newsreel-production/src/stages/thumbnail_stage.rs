use crate::assets::{AssetRecord, AssetType};
use crate::error::{ProductionError, Result};
use crate::job::{ProductionJob, StageId};
use crate::pipeline::{StageArtifact, StageContext, StageHandler};
use async_trait::async_trait;
use tracing::info;

/// Thumbnail stage: up to `max_thumbnails` variants for the metadata
/// title. Runs only after metadata exists; skipped entirely when the job
/// already carries usable thumbnails.
///
/// The first variant is registered as a fresh asset; later variants are
/// versions of it, preserving lineage for A/B evaluation.
pub struct ThumbnailStage;

#[async_trait]
impl StageHandler for ThumbnailStage {
    fn stage_id(&self) -> StageId {
        StageId::Thumbnail
    }

    fn is_complete(&self, job: &ProductionJob) -> bool {
        job.has_thumbnails()
    }

    async fn execute(&self, job: &ProductionJob, ctx: &StageContext) -> Result<StageArtifact> {
        let title = job
            .viral_metadata
            .as_ref()
            .map(|m| m.title.clone())
            .ok_or(ProductionError::MissingArtifact(StageId::Metadata))?;

        let mut urls = Vec::new();
        let mut original: Option<AssetRecord> = None;

        for variant in 0..ctx.config.max_thumbnails {
            let url = ctx.generator.generate_thumbnail(&title, &ctx.config).await?;

            match &original {
                None => {
                    let record = AssetRecord::new(AssetType::Image, &url, &job.channel_id)
                        .with_production(job.id)
                        .with_dialogue(&title);
                    ctx.assets.register_asset(&record).await?;
                    original = Some(record);
                }
                Some(first) => {
                    ctx.assets
                        .create_asset_version(
                            &job.channel_id,
                            first.id,
                            &url,
                            format!("variant-{}", variant + 1),
                        )
                        .await?;
                }
            }

            urls.push(url);
        }

        info!(job_id = %job.id, variants = urls.len(), "thumbnails ready");
        Ok(StageArtifact::Thumbnail { urls })
    }
}
