//! Checkpointing: durable job snapshots plus a per-stage artifact table.
//!
//! A checkpoint is written after every completed stage so an interrupted
//! job resumes where it stopped. The job snapshot holds the user-visible
//! fields; the stage artifact records additionally carry intermediate
//! outputs (per-segment audio tracks, video clips) that the merge stage
//! consumes but the job record does not expose.

use crate::dag::Fingerprints;
use crate::error::Result;
use crate::job::{ProductionJob, StageId};
use crate::pipeline::StageArtifact;
use newsreel_storage::{RecordFilter, RecordStore, StoredRecord};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct CheckpointManager {
    store: Arc<dyn RecordStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Persist the job snapshot (upsert on the job key).
    pub async fn save_job(&self, job: &ProductionJob) -> Result<()> {
        let record = StoredRecord::new(
            &job.channel_id,
            Fingerprints::job_key(job.id),
            serde_json::to_value(job)?,
        );
        self.store.upsert(record).await?;
        debug!(job_id = %job.id, step = job.current_step, "job checkpoint saved");
        Ok(())
    }

    /// Load the latest job snapshot, or `None` when the job was never
    /// checkpointed.
    pub async fn load_job(&self, channel_id: &str, job_id: Uuid) -> Result<Option<ProductionJob>> {
        let Some(record) = self
            .store
            .get(channel_id, &Fingerprints::job_key(job_id))
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(record.value)?))
    }

    pub async fn save_stage_artifact(
        &self,
        channel_id: &str,
        job_id: Uuid,
        artifact: &StageArtifact,
    ) -> Result<()> {
        let record = StoredRecord::new(
            channel_id,
            Fingerprints::stage_key(job_id, artifact.stage_id()),
            serde_json::to_value(artifact)?,
        );
        self.store.upsert(record).await?;
        debug!(job_id = %job_id, stage = %artifact.stage_id(), "stage artifact saved");
        Ok(())
    }

    pub async fn load_stage_artifact(
        &self,
        channel_id: &str,
        job_id: Uuid,
        stage: StageId,
    ) -> Result<Option<StageArtifact>> {
        let Some(record) = self
            .store
            .get(channel_id, &Fingerprints::stage_key(job_id, stage))
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(record.value)?))
    }

    /// Stages with a persisted artifact; used to skip completed work on
    /// resume.
    pub async fn completed_stages(
        &self,
        channel_id: &str,
        job_id: Uuid,
    ) -> Result<HashSet<StageId>> {
        let prefix = Fingerprints::stage_key_prefix(job_id);
        let records = self
            .store
            .query(channel_id, &RecordFilter::prefix(prefix.clone()))
            .await?;

        let mut stages = HashSet::new();
        for record in records {
            if let Some(name) = record.key.strip_prefix(&prefix) {
                if let Ok(stage) = StageId::from_str(name) {
                    stages.insert(stage);
                }
            }
        }
        Ok(stages)
    }

    /// Drop the stage artifact records for a job (the snapshot stays).
    /// Called once a job completes; regeneration re-creates them.
    pub async fn delete_stage_artifacts(&self, channel_id: &str, job_id: Uuid) -> Result<()> {
        let prefix = Fingerprints::stage_key_prefix(job_id);
        let records = self
            .store
            .query(channel_id, &RecordFilter::prefix(prefix))
            .await?;
        for record in records {
            self.store.delete(channel_id, &record.key).await?;
        }
        Ok(())
    }
}
