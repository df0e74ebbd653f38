use crate::error::{ProductionError, Result};
use crate::job::{SourceItem, StageId};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Deterministic key derivation for cache entries and checkpoints.
///
/// A fingerprint is a stable string built from the generation inputs;
/// two jobs with the same channel and selection share fingerprints, which
/// is what makes the content cache pay off across reruns.
#[derive(Debug, Clone)]
pub struct Fingerprints {
    channel_id: String,
    date_key: String,
}

impl Fingerprints {
    pub fn new(channel_id: String, date_key: String) -> Self {
        Self {
            channel_id,
            date_key,
        }
    }

    fn selection_ids(items: &[SourceItem]) -> String {
        let mut ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        ids.sort_unstable();
        ids.join("+")
    }

    pub fn script_key(&self, items: &[SourceItem]) -> String {
        format!("script:{}:{}", self.channel_id, Self::selection_ids(items))
    }

    pub fn metadata_key(&self, items: &[SourceItem]) -> String {
        format!(
            "metadata:{}:{}:{}",
            self.channel_id,
            self.date_key,
            Self::selection_ids(items)
        )
    }

    /// Audio keys embed the spoken text so near-identical lines can be
    /// served by the fuzzy lookup path.
    pub fn audio_key(&self, voice_id: &str, text: &str) -> String {
        format!("audio:{}:{}:{}", self.channel_id, voice_id, text)
    }

    pub fn video_key(&self, prompt: &str) -> String {
        format!("video:{}:{}", self.channel_id, prompt)
    }

    pub fn job_key(job_id: Uuid) -> String {
        format!("production:{}", job_id)
    }

    pub fn stage_key(job_id: Uuid, stage: StageId) -> String {
        format!("production:{}:stage:{}", job_id, stage)
    }

    pub fn stage_key_prefix(job_id: Uuid) -> String {
        format!("production:{}:stage:", job_id)
    }
}

/// Stage node in the pipeline DAG
#[derive(Debug, Clone)]
pub struct StageNode {
    pub id: StageId,
    pub name: &'static str,
    pub dependencies: Vec<StageId>,
    pub timeout_ms: u64,
}

impl StageNode {
    pub fn new(
        id: StageId,
        name: &'static str,
        dependencies: Vec<StageId>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            id,
            name,
            dependencies,
            timeout_ms,
        }
    }
}

/// Pipeline DAG with topological sort into parallel phases
#[derive(Debug, Clone)]
pub struct PipelineDAG {
    stages: HashMap<StageId, StageNode>,
    execution_order: Vec<Vec<StageId>>, // Vec of parallel groups
}

impl PipelineDAG {
    /// Create a new DAG from stage definitions
    pub fn new(stages: Vec<StageNode>) -> Result<Self> {
        let mut stage_map = HashMap::new();
        for stage in stages {
            stage_map.insert(stage.id, stage);
        }

        // Validate dependencies exist
        for stage in stage_map.values() {
            for dep in &stage.dependencies {
                if !stage_map.contains_key(dep) {
                    return Err(ProductionError::StageExecutionFailed(format!(
                        "Stage {} depends on non-existent stage {}",
                        stage.id, dep
                    )));
                }
            }
        }

        let execution_order = Self::topological_sort(&stage_map)?;

        Ok(Self {
            stages: stage_map,
            execution_order,
        })
    }

    /// The production pipeline:
    /// Script -> (SegmentAudio ∥ SegmentVideo ∥ BackgroundVideo ∥ Metadata)
    /// -> Merge -> Thumbnail
    pub fn production_pipeline() -> Result<Self> {
        let stages = vec![
            StageNode::new(StageId::Script, "Script", vec![], 120_000),
            StageNode::new(
                StageId::SegmentAudio,
                "Segment audio",
                vec![StageId::Script],
                300_000,
            ),
            StageNode::new(
                StageId::SegmentVideo,
                "Segment video",
                vec![StageId::Script],
                600_000,
            ),
            StageNode::new(
                StageId::BackgroundVideo,
                "Background video",
                vec![StageId::Script],
                600_000,
            ),
            StageNode::new(
                StageId::Metadata,
                "Viral metadata",
                vec![StageId::Script],
                120_000,
            ),
            StageNode::new(
                StageId::Merge,
                "Merge segments",
                vec![
                    StageId::SegmentAudio,
                    StageId::SegmentVideo,
                    StageId::BackgroundVideo,
                    StageId::Metadata,
                ],
                30_000,
            ),
            StageNode::new(
                StageId::Thumbnail,
                "Thumbnails",
                vec![StageId::Merge],
                180_000,
            ),
        ];

        Self::new(stages)
    }

    /// Topological sort with parallel group detection
    fn topological_sort(stages: &HashMap<StageId, StageNode>) -> Result<Vec<Vec<StageId>>> {
        let mut in_degree: HashMap<StageId, usize> = stages
            .values()
            .map(|stage| (stage.id, stage.dependencies.len()))
            .collect();

        let mut result = Vec::new();
        let mut processed = HashSet::new();

        while processed.len() < stages.len() {
            // All stages with in-degree 0 can run in parallel
            let mut ready: Vec<StageId> = in_degree
                .iter()
                .filter(|(id, &degree)| degree == 0 && !processed.contains(*id))
                .map(|(&id, _)| id)
                .collect();

            if ready.is_empty() {
                return Err(ProductionError::StageExecutionFailed(
                    "Pipeline DAG contains a cycle".to_string(),
                ));
            }

            // HashMap iteration order is arbitrary; keep phases stable.
            ready.sort_by_key(|id| id.as_str());
            result.push(ready.clone());

            for &stage_id in &ready {
                processed.insert(stage_id);
                in_degree.remove(&stage_id);

                for dependent in stages.values() {
                    if dependent.dependencies.contains(&stage_id) {
                        if let Some(degree) = in_degree.get_mut(&dependent.id) {
                            *degree -= 1;
                        }
                    }
                }
            }
        }

        Ok(result)
    }

    pub fn execution_order(&self) -> &[Vec<StageId>] {
        &self.execution_order
    }

    pub fn get_stage(&self, id: StageId) -> Option<&StageNode> {
        self.stages.get(&id)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Execution plan as a string (for logging)
    pub fn execution_plan(&self) -> String {
        self.execution_order
            .iter()
            .enumerate()
            .map(|(i, group)| {
                let stage_names: Vec<_> = group.iter().map(|id| self.stages[id].name).collect();

                if group.len() > 1 {
                    format!("Phase {}: {} (parallel)", i + 1, stage_names.join(" ∥ "))
                } else {
                    format!("Phase {}: {}", i + 1, stage_names[0])
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
