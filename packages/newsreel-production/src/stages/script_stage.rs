use crate::error::Result;
use crate::job::{ProductionJob, ScriptLine, StageId};
use crate::pipeline::{StageArtifact, StageContext, StageHandler};
use async_trait::async_trait;
use tracing::info;

/// Script stage: produce the dialogue script and the viral hook.
///
/// The hook is regenerated on every run, even when a persisted script is
/// reused, so downstream metadata always reflects the current hook.
pub struct ScriptStage;

#[async_trait]
impl StageHandler for ScriptStage {
    fn stage_id(&self) -> StageId {
        StageId::Script
    }

    async fn execute(&self, job: &ProductionJob, ctx: &StageContext) -> Result<StageArtifact> {
        let hook = ctx
            .generator
            .generate_hook(&ctx.selection, &ctx.config)
            .await?;

        if job.has_script() {
            info!(
                job_id = %job.id,
                lines = job.script.len(),
                "reusing persisted script, hook refreshed"
            );
            return Ok(StageArtifact::Script {
                lines: job.script.clone(),
                hook,
            });
        }

        let key = ctx.fingerprints.script_key(&ctx.selection);
        let lines: Vec<ScriptLine> = ctx
            .cache
            .get_or_generate_with_fuzzy(
                &key,
                ctx.config.script_ttl(),
                ctx.config.script_cost,
                ctx.config.fuzzy_threshold,
                || async {
                    ctx.generator
                        .generate_script(&ctx.selection, &ctx.config, &hook)
                        .await
                },
            )
            .await?;

        info!(job_id = %job.id, lines = lines.len(), "script ready");
        Ok(StageArtifact::Script { lines, hook })
    }
}
