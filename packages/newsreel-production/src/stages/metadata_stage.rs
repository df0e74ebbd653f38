use crate::error::Result;
use crate::job::{ProductionJob, StageId, ViralMetadata};
use crate::pipeline::{StageArtifact, StageContext, StageHandler};
use async_trait::async_trait;
use tracing::info;

/// Metadata stage: title, description and tags for publishing.
pub struct MetadataStage;

#[async_trait]
impl StageHandler for MetadataStage {
    fn stage_id(&self) -> StageId {
        StageId::Metadata
    }

    fn is_complete(&self, job: &ProductionJob) -> bool {
        job.viral_metadata.is_some()
    }

    async fn execute(&self, job: &ProductionJob, ctx: &StageContext) -> Result<StageArtifact> {
        let key = ctx.fingerprints.metadata_key(&ctx.selection);
        let metadata: ViralMetadata = ctx
            .cache
            .get_or_generate(
                &key,
                ctx.config.metadata_ttl(),
                ctx.config.metadata_cost,
                || async {
                    ctx.generator
                        .generate_metadata(&ctx.selection, &ctx.config, &job.date_key)
                        .await
                },
            )
            .await?;

        info!(job_id = %job.id, title = %metadata.title, "metadata ready");
        Ok(StageArtifact::Metadata { metadata })
    }
}
