/*
 * Newsreel Production - Resumable Media Production Pipeline
 *
 * Turns a day's selected stories for a channel into a finished media
 * package: script, per-segment audio and video, viral metadata, and
 * thumbnails.
 *
 * Architecture:
 * - Job State Machine (pure, validated transitions)
 * - Stage DAG (script -> media fan-out -> merge -> thumbnails)
 * - Checkpoint/Resume System (job snapshots + stage artifact table)
 * - Content Cache (two tiers, TTL, fuzzy retrieval, single-flight)
 * - Asset Similarity Index (reuse scoring, popularity, lineage)
 * - Provider Ports (generation, blob storage)
 */

// Public modules
pub mod assets;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod dag;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod providers;
pub mod similarity;
pub mod stages;

// Re-exports
pub use assets::{AssetCriteria, AssetMatch, AssetRecord, AssetSimilarityIndex, AssetType};
pub use cache::{CacheEntry, CacheStats, ContentCache};
pub use checkpoint::CheckpointManager;
pub use config::ProductionConfig;
pub use controller::PipelineController;
pub use dag::{Fingerprints, PipelineDAG, StageNode};
pub use error::{ProductionError, Result};
pub use job::{
    JobEvent, JobState, JobStateMachine, JobStatus, ProductionJob, ScriptLine, Segment,
    SourceItem, StageId, VideoAssets, ViralMetadata,
};
pub use pipeline::{
    AudioTrack, ProgressEvent, ProgressSender, SegmentClip, StageArtifact, StageContext,
    StageHandler,
};
pub use providers::{BlobStore, GeneratedAudio, Generator};
pub use similarity::{levenshtein_distance, normalized_similarity};
