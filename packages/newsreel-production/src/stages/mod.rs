// Stage implementations
pub mod audio_stage;
pub mod background_stage;
pub mod merge_stage;
pub mod metadata_stage;
pub mod script_stage;
pub mod thumbnail_stage;
pub mod video_stage;

// Re-exports
pub use audio_stage::SegmentAudioStage;
pub use background_stage::BackgroundVideoStage;
pub use merge_stage::MergeStage;
pub use metadata_stage::MetadataStage;
pub use script_stage::ScriptStage;
pub use thumbnail_stage::ThumbnailStage;
pub use video_stage::SegmentVideoStage;

use crate::pipeline::StageHandler;
use std::sync::Arc;

/// Handlers for the standard production pipeline.
pub fn production_handlers() -> Vec<Arc<dyn StageHandler>> {
    vec![
        Arc::new(ScriptStage),
        Arc::new(SegmentAudioStage),
        Arc::new(SegmentVideoStage),
        Arc::new(BackgroundVideoStage),
        Arc::new(MetadataStage),
        Arc::new(MergeStage),
        Arc::new(ThumbnailStage),
    ]
}
