use crate::assets::AssetSimilarityIndex;
use crate::cache::ContentCache;
use crate::checkpoint::CheckpointManager;
use crate::config::ProductionConfig;
use crate::dag::{Fingerprints, PipelineDAG, StageNode};
use crate::error::{ProductionError, Result};
use crate::job::{JobEvent, JobState, JobStateMachine, ProductionJob, SourceItem, StageId};
use crate::pipeline::{ProgressEvent, ProgressSender, StageArtifact, StageContext, StageHandler};
use crate::providers::{BlobStore, Generator};
use crate::stages::production_handlers;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

const MEDIA_STAGES: [StageId; 4] = [
    StageId::SegmentAudio,
    StageId::SegmentVideo,
    StageId::BackgroundVideo,
    StageId::Metadata,
];

/// Drives a production job through the stage DAG: checks the content
/// cache and asset index before invoking generation, checkpoints after
/// every stage, and resumes interrupted jobs by skipping stages whose
/// artifacts already exist.
pub struct PipelineController {
    dag: Arc<PipelineDAG>,
    handlers: HashMap<StageId, Arc<dyn StageHandler>>,
    cache: Arc<ContentCache>,
    assets: Arc<AssetSimilarityIndex>,
    checkpoints: Arc<CheckpointManager>,
    generator: Arc<dyn Generator>,
    blobs: Arc<dyn BlobStore>,
    config: Arc<ProductionConfig>,
    progress: Option<ProgressSender>,
    cancel: CancellationToken,
}

impl PipelineController {
    pub fn new(
        cache: Arc<ContentCache>,
        assets: Arc<AssetSimilarityIndex>,
        checkpoints: Arc<CheckpointManager>,
        generator: Arc<dyn Generator>,
        blobs: Arc<dyn BlobStore>,
        config: ProductionConfig,
    ) -> Result<Self> {
        let mut controller = Self {
            dag: Arc::new(PipelineDAG::production_pipeline()?),
            handlers: HashMap::new(),
            cache,
            assets,
            checkpoints,
            generator,
            blobs,
            config: Arc::new(config),
            progress: None,
            cancel: CancellationToken::new(),
        };
        for handler in production_handlers() {
            controller.register_handler(handler);
        }
        Ok(controller)
    }

    pub fn register_handler(&mut self, handler: Arc<dyn StageHandler>) {
        self.handlers.insert(handler.stage_id(), handler);
    }

    /// Receive `{step_index, step_count, label}` events as stages settle.
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Cancellation is observed at every stage boundary and inside
    /// in-flight stage execution.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Reload a checkpointed job and resume it. A failing checkpoint
    /// read is fatal to the resume attempt only.
    pub async fn resume_from_checkpoint(
        &self,
        channel_id: &str,
        job_id: Uuid,
        selection: Vec<SourceItem>,
    ) -> Result<ProductionJob> {
        let job = self
            .checkpoints
            .load_job(channel_id, job_id)
            .await?
            .ok_or(ProductionError::CheckpointNotFound(job_id))?;
        self.start_or_resume(job, selection).await
    }

    /// Explicit full regeneration of a terminal job: stage artifacts and
    /// the step counter are discarded and the pipeline runs again under
    /// the same job identity. This is the only path that resets
    /// `current_step`.
    pub async fn regenerate(
        &self,
        job: ProductionJob,
        selection: Vec<SourceItem>,
    ) -> Result<ProductionJob> {
        let channel_id = job.channel_id.clone();
        let job_id = job.id;

        let mut sm = JobStateMachine::new(job);
        sm.apply(JobEvent::RegenerationRequested)?;

        // Unlike per-stage checkpoint writes this delete is fatal on
        // error: leftover artifacts would silently skip regeneration.
        self.checkpoints
            .delete_stage_artifacts(&channel_id, job_id)
            .await?;

        info!(job_id = %job_id, "regenerating production from scratch");
        self.start_or_resume(sm.into_job(), selection).await
    }

    /// Run a job to a terminal state and return it.
    ///
    /// A stage failure is returned as the job in Failed state, with the
    /// artifacts of already-checkpointed stages retained for resume;
    /// `Err` is reserved for validation problems and checkpoint reads.
    ///
    /// Concurrent calls for the same job id are not mutually excluded
    /// here; callers deploying more than one instance need an advisory
    /// lock around the job id.
    pub async fn start_or_resume(
        &self,
        mut job: ProductionJob,
        selection: Vec<SourceItem>,
    ) -> Result<ProductionJob> {
        self.validate(&job, &selection)?;

        if job.selected_item_ids.is_empty() {
            job.selected_item_ids = selection.iter().map(|item| item.id.clone()).collect();
        }

        let job_id = job.id;
        let channel_id = job.channel_id.clone();

        let mut sm = JobStateMachine::new(job);
        match sm.job().state {
            JobState::Completed { .. } => {
                info!(job_id = %job_id, "job already completed, nothing to do");
                return Ok(sm.into_job());
            }
            JobState::Created => {}
            _ => {
                info!(
                    job_id = %job_id,
                    from = sm.job().state.state_name(),
                    "resuming job"
                );
                sm.apply(JobEvent::Resumed)?;
            }
        }

        let ctx = StageContext {
            fingerprints: Fingerprints::new(channel_id.clone(), sm.job().date_key.clone()),
            cache: self.cache.clone(),
            assets: self.assets.clone(),
            generator: self.generator.clone(),
            blobs: self.blobs.clone(),
            checkpoints: self.checkpoints.clone(),
            config: self.config.clone(),
            selection: Arc::new(selection),
            run_artifacts: Arc::new(DashMap::new()),
            cancel: self.cancel.clone(),
        };

        // Checkpoint READ: a failure here is fatal to the attempt.
        let completed = self.checkpoints.completed_stages(&channel_id, job_id).await?;
        if !completed.is_empty() {
            info!(
                job_id = %job_id,
                stages = completed.len(),
                "found checkpointed stages, they will be skipped"
            );
        }

        info!(job_id = %job_id, "execution plan:\n{}", self.dag.execution_plan());

        let step_count = self.dag.stage_count();
        let mut step_index = 0usize;

        for group in self.dag.execution_order().to_vec() {
            self.apply_entry_events(&mut sm, &group)?;

            let mut to_run: Vec<Arc<dyn StageHandler>> = Vec::new();
            for stage_id in &group {
                let handler = self.handlers.get(stage_id).ok_or_else(|| {
                    ProductionError::StageExecutionFailed(format!(
                        "no handler registered for stage {}",
                        stage_id
                    ))
                })?;

                // The script stage always runs: the viral hook is
                // refreshed even when the script itself is reused.
                let skip = *stage_id != StageId::Script
                    && (completed.contains(stage_id) || handler.is_complete(sm.job()));

                if skip {
                    info!(job_id = %job_id, stage = %stage_id, "stage already complete, skipping");
                    step_index += 1;
                    let job = sm.job_mut();
                    job.current_step = job.current_step.max(step_index as u32);
                    self.emit_progress(step_index, step_count, self.stage_name(*stage_id));
                } else {
                    to_run.push(handler.clone());
                }
            }

            if !to_run.is_empty() {
                let mut tasks = Vec::new();
                for handler in &to_run {
                    let node = self
                        .dag
                        .get_stage(handler.stage_id())
                        .cloned()
                        .ok_or_else(|| {
                            ProductionError::StageExecutionFailed(format!(
                                "stage {} missing from DAG",
                                handler.stage_id()
                            ))
                        })?;

                    let handler = handler.clone();
                    let job_snapshot = sm.job().clone();
                    let stage_ctx = ctx.clone();
                    tasks.push(tokio::spawn(async move {
                        Self::execute_stage(handler, node, job_snapshot, stage_ctx).await
                    }));
                }

                // Fan-in barrier: every task settles before the phase is
                // judged, and successful artifacts are applied and
                // checkpointed before any failure surfaces, so a resume
                // skips them.
                let results = futures::future::join_all(tasks).await;

                let mut first_failure: Option<(StageId, ProductionError)> = None;
                for (i, task_result) in results.into_iter().enumerate() {
                    let stage_id = to_run[i].stage_id();

                    match task_result {
                        Ok(Ok(artifact)) => {
                            artifact.apply_to(sm.job_mut());
                            ctx.run_artifacts.insert(stage_id, artifact.clone());
                            step_index += 1;
                            let job = sm.job_mut();
                            job.current_step = job.current_step.max(step_index as u32);

                            self.checkpoint(&sm, &artifact).await;
                            info!(job_id = %job_id, stage = %stage_id, "stage completed");
                            self.emit_progress(step_index, step_count, self.stage_name(stage_id));
                        }
                        Ok(Err(err)) => {
                            error!(job_id = %job_id, stage = %stage_id, error = %err, "stage failed");
                            if first_failure.is_none() {
                                first_failure = Some((stage_id, err));
                            }
                        }
                        Err(join_err) => {
                            error!(job_id = %job_id, stage = %stage_id, error = %join_err, "stage panicked");
                            if first_failure.is_none() {
                                first_failure = Some((
                                    stage_id,
                                    ProductionError::StageExecutionFailed(format!(
                                        "stage {} panicked: {}",
                                        stage_id, join_err
                                    )),
                                ));
                            }
                        }
                    }
                }

                if let Some((stage_id, err)) = first_failure {
                    return self.fail_job(sm, stage_id, err).await;
                }
            }

            self.apply_exit_events(&mut sm, &group)?;
            if let Err(err) = self.checkpoints.save_job(sm.job()).await {
                warn!(job_id = %job_id, error = %err, "job checkpoint write failed, continuing");
            }
        }

        // The snapshot remains the durable record; stage intermediates
        // are no longer needed once the job is complete.
        if let Err(err) = self
            .checkpoints
            .delete_stage_artifacts(&channel_id, job_id)
            .await
        {
            warn!(job_id = %job_id, error = %err, "stage artifact cleanup failed");
        }

        info!(
            job_id = %job_id,
            segments = sm.job().segments.len(),
            cache_cost_saved = self.cache.stats().total_cost_saved,
            "production completed"
        );
        Ok(sm.into_job())
    }

    fn validate(&self, job: &ProductionJob, selection: &[SourceItem]) -> Result<()> {
        if job.channel_id.trim().is_empty() {
            return Err(ProductionError::Validation("job has no channel".into()));
        }
        if selection.is_empty() {
            return Err(ProductionError::Validation("no items selected".into()));
        }
        if job.channel_id != self.cache.channel_id() {
            return Err(ProductionError::Validation(format!(
                "job channel {} does not match cache scope {}",
                job.channel_id,
                self.cache.channel_id()
            )));
        }
        Ok(())
    }

    fn stage_name(&self, stage_id: StageId) -> &'static str {
        self.dag
            .get_stage(stage_id)
            .map(|node| node.name)
            .unwrap_or(stage_id.as_str())
    }

    fn apply_entry_events(&self, sm: &mut JobStateMachine, group: &[StageId]) -> Result<()> {
        if group.contains(&StageId::Script)
            && !sm.job().has_script()
            && matches!(sm.job().state, JobState::Created)
        {
            sm.apply(JobEvent::ScriptRequested)?;
        }
        if group.iter().any(|s| MEDIA_STAGES.contains(s))
            && matches!(sm.job().state, JobState::ScriptReady { .. })
        {
            sm.apply(JobEvent::MediaRequested)?;
        }
        if group.contains(&StageId::Thumbnail)
            && matches!(sm.job().state, JobState::MediaReady { .. })
        {
            sm.apply(JobEvent::ThumbnailRequested)?;
        }
        Ok(())
    }

    fn apply_exit_events(&self, sm: &mut JobStateMachine, group: &[StageId]) -> Result<()> {
        if group.contains(&StageId::Script) {
            sm.apply(JobEvent::ScriptProduced)?;
        }
        if group.contains(&StageId::Merge) {
            sm.apply(JobEvent::MediaProduced)?;
        }
        if group.contains(&StageId::Thumbnail) {
            sm.apply(JobEvent::ThumbnailProduced)?;
        }
        Ok(())
    }

    /// Checkpoint WRITE: sequential, observed, never fatal — a storage
    /// hiccup must not abort a stage that already succeeded.
    async fn checkpoint(&self, sm: &JobStateMachine, artifact: &StageArtifact) {
        let job = sm.job();
        if let Err(err) = self
            .checkpoints
            .save_stage_artifact(&job.channel_id, job.id, artifact)
            .await
        {
            warn!(
                job_id = %job.id,
                stage = %artifact.stage_id(),
                error = %err,
                "stage artifact write failed, continuing"
            );
        }
        if let Err(err) = self.checkpoints.save_job(job).await {
            warn!(job_id = %job.id, error = %err, "job checkpoint write failed, continuing");
        }
    }

    async fn fail_job(
        &self,
        mut sm: JobStateMachine,
        stage: StageId,
        err: ProductionError,
    ) -> Result<ProductionJob> {
        error!(
            job_id = %sm.job().id,
            stage = %stage,
            error = %err,
            "job failed; checkpointed artifacts are retained for resume"
        );
        sm.apply(JobEvent::StageFailed {
            stage,
            error: err.to_string(),
        })?;
        if let Err(write_err) = self.checkpoints.save_job(sm.job()).await {
            warn!(job_id = %sm.job().id, error = %write_err, "failed-job checkpoint write failed");
        }
        Ok(sm.into_job())
    }

    /// Run one stage under its timeout with cancellation observed. A
    /// provider that never resolves surfaces as a stage timeout instead
    /// of stalling the job forever.
    async fn execute_stage(
        handler: Arc<dyn StageHandler>,
        node: StageNode,
        job: ProductionJob,
        ctx: StageContext,
    ) -> Result<StageArtifact> {
        let stage_id = node.id;
        if ctx.cancel.is_cancelled() {
            return Err(ProductionError::Cancelled(format!(
                "stage {} cancelled before start",
                stage_id
            )));
        }
        info!(job_id = %job.id, stage = %stage_id, "executing stage: {}", node.name);

        let timeout = tokio::time::Duration::from_millis(node.timeout_ms);
        let cancel = ctx.cancel.clone();

        tokio::select! {
            _ = cancel.cancelled() => Err(ProductionError::Cancelled(format!(
                "stage {} cancelled",
                stage_id
            ))),
            result = tokio::time::timeout(timeout, handler.execute(&job, &ctx)) => match result {
                Ok(inner) => inner,
                Err(_) => Err(ProductionError::Timeout {
                    stage: stage_id,
                    timeout_ms: node.timeout_ms,
                }),
            },
        }
    }

    fn emit_progress(&self, step_index: usize, step_count: usize, label: &str) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(ProgressEvent {
                step_index,
                step_count,
                label: label.to_string(),
            });
        }
    }
}
