//! Asset similarity index: scores and ranks previously generated media
//! for reuse, so a segment whose dialogue and framing are close enough to
//! an existing clip skips the generation call entirely.
//!
//! Records are persisted through the record store under the channel
//! scope (`asset:{id}` keys) and are never deleted here; housekeeping is
//! an external concern.

use crate::error::{ProductionError, Result};
use crate::similarity::normalized_similarity;
use chrono::{DateTime, Utc};
use newsreel_storage::{RecordFilter, RecordStore, StoredRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Weight of the dialogue-text component, applied only above the gate.
const TEXT_WEIGHT: f64 = 0.5;
/// Text similarity below this contributes nothing to the score.
const TEXT_GATE: f64 = 0.7;
const SCENE_WEIGHT: f64 = 0.3;
const SHOT_WEIGHT: f64 = 0.2;

/// Default minimum total score for a reusable match.
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Video,
    Audio,
    Image,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Video => "video",
            AssetType::Audio => "audio",
            AssetType::Image => "image",
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reusable generated media artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: Uuid,
    pub asset_type: AssetType,
    pub url: String,
    pub channel_id: String,
    /// Owning job; cleared once an asset is shared across productions.
    pub production_id: Option<Uuid>,
    pub dialogue_text: Option<String>,
    pub scene_type: Option<String>,
    pub shot_type: Option<String>,
    pub duration_secs: Option<f64>,
    pub resolution: Option<String>,
    pub aspect_ratio: Option<String>,
    pub use_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Lineage for derived versions.
    pub original_asset_id: Option<Uuid>,
    pub variation_label: Option<String>,
}

impl AssetRecord {
    pub fn new(asset_type: AssetType, url: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_type,
            url: url.into(),
            channel_id: channel_id.into(),
            production_id: None,
            dialogue_text: None,
            scene_type: None,
            shot_type: None,
            duration_secs: None,
            resolution: None,
            aspect_ratio: None,
            use_count: 0,
            created_at: Utc::now(),
            last_used_at: None,
            original_asset_id: None,
            variation_label: None,
        }
    }

    pub fn with_production(mut self, production_id: Uuid) -> Self {
        self.production_id = Some(production_id);
        self
    }

    pub fn with_dialogue(mut self, text: impl Into<String>) -> Self {
        self.dialogue_text = Some(text.into());
        self
    }

    pub fn with_scene(mut self, scene_type: impl Into<String>) -> Self {
        self.scene_type = Some(scene_type.into());
        self
    }

    pub fn with_shot(mut self, shot_type: impl Into<String>) -> Self {
        self.shot_type = Some(shot_type.into());
        self
    }

    pub fn with_format(
        mut self,
        resolution: impl Into<String>,
        aspect_ratio: impl Into<String>,
    ) -> Self {
        self.resolution = Some(resolution.into());
        self.aspect_ratio = Some(aspect_ratio.into());
        self
    }
}

/// Search criteria for [`AssetSimilarityIndex::find_similar_assets`].
#[derive(Debug, Clone)]
pub struct AssetCriteria {
    pub dialogue_text: Option<String>,
    pub scene_type: Option<String>,
    pub shot_type: Option<String>,
    pub min_similarity: f64,
}

impl Default for AssetCriteria {
    fn default() -> Self {
        Self {
            dialogue_text: None,
            scene_type: None,
            shot_type: None,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

/// A scored candidate with the criteria that matched, human-readable.
#[derive(Debug, Clone)]
pub struct AssetMatch {
    pub asset: AssetRecord,
    pub score: f64,
    pub match_reason: String,
}

pub struct AssetSimilarityIndex {
    store: Arc<dyn RecordStore>,
}

fn record_key(id: Uuid) -> String {
    format!("asset:{}", id)
}

impl AssetSimilarityIndex {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Persist a freshly generated asset.
    pub async fn register_asset(&self, asset: &AssetRecord) -> Result<()> {
        let record = StoredRecord::new(
            &asset.channel_id,
            record_key(asset.id),
            serde_json::to_value(asset)?,
        );
        self.store.upsert(record).await?;
        debug!(asset_id = %asset.id, asset_type = %asset.asset_type, "registered asset");
        Ok(())
    }

    pub async fn get_asset(&self, channel_id: &str, id: Uuid) -> Result<Option<AssetRecord>> {
        let Some(record) = self.store.get(channel_id, &record_key(id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(record.value)?))
    }

    async fn channel_assets(
        &self,
        channel_id: &str,
        asset_type: Option<AssetType>,
    ) -> Result<Vec<AssetRecord>> {
        let records = self
            .store
            .query(channel_id, &RecordFilter::prefix("asset:"))
            .await?;

        let mut assets = Vec::with_capacity(records.len());
        for record in records {
            let asset: AssetRecord = match serde_json::from_value(record.value) {
                Ok(asset) => asset,
                Err(_) => continue,
            };
            if asset_type.map_or(true, |t| asset.asset_type == t) {
                assets.push(asset);
            }
        }
        Ok(assets)
    }

    fn score(asset: &AssetRecord, criteria: &AssetCriteria) -> (f64, Vec<String>) {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        if let (Some(want), Some(have)) = (&criteria.dialogue_text, &asset.dialogue_text) {
            let sim = normalized_similarity(&want.to_lowercase(), &have.to_lowercase());
            if sim > TEXT_GATE {
                score += sim * TEXT_WEIGHT;
                reasons.push(format!("dialogue {:.0}% similar", sim * 100.0));
            }
        }

        if let (Some(want), Some(have)) = (&criteria.scene_type, &asset.scene_type) {
            if want == have {
                score += SCENE_WEIGHT;
                reasons.push(format!("same scene type ({})", have));
            }
        }

        if let (Some(want), Some(have)) = (&criteria.shot_type, &asset.shot_type) {
            if want == have {
                score += SHOT_WEIGHT;
                reasons.push(format!("same shot type ({})", have));
            }
        }

        (score, reasons)
    }

    /// All channel assets of the given type scoring at least
    /// `criteria.min_similarity`, best first.
    pub async fn find_similar_assets(
        &self,
        channel_id: &str,
        asset_type: AssetType,
        criteria: &AssetCriteria,
    ) -> Result<Vec<AssetMatch>> {
        let assets = self.channel_assets(channel_id, Some(asset_type)).await?;

        let mut matches: Vec<AssetMatch> = assets
            .into_iter()
            .filter_map(|asset| {
                let (score, reasons) = Self::score(&asset, criteria);
                if score >= criteria.min_similarity {
                    Some(AssetMatch {
                        asset,
                        score,
                        match_reason: reasons.join(", "),
                    })
                } else {
                    None
                }
            })
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        debug!(
            channel_id,
            candidates = matches.len(),
            "asset similarity search complete"
        );
        Ok(matches)
    }

    /// Count a reuse: bumps `use_count` and stamps `last_used_at`. Feeds
    /// popularity ranking and the cost-savings audit trail.
    pub async fn record_reuse(&self, channel_id: &str, asset_id: Uuid) -> Result<()> {
        let mut asset = self
            .get_asset(channel_id, asset_id)
            .await?
            .ok_or_else(|| {
                ProductionError::Persistence(newsreel_storage::StorageError::record_not_found(
                    channel_id,
                    record_key(asset_id),
                ))
            })?;

        asset.use_count += 1;
        asset.last_used_at = Some(Utc::now());
        self.register_asset(&asset).await?;
        info!(asset_id = %asset_id, use_count = asset.use_count, "asset reused");
        Ok(())
    }

    /// Channel assets ordered by `use_count` descending.
    pub async fn popular_assets(
        &self,
        channel_id: &str,
        asset_type: Option<AssetType>,
        limit: usize,
    ) -> Result<Vec<AssetRecord>> {
        let mut assets = self.channel_assets(channel_id, asset_type).await?;
        assets.sort_by(|a, b| b.use_count.cmp(&a.use_count));
        assets.truncate(limit);
        Ok(assets)
    }

    /// Derive a new asset from an original (A/B variation): descriptive
    /// attributes are copied, `use_count` starts at zero, and lineage is
    /// recorded via `original_asset_id`.
    pub async fn create_asset_version(
        &self,
        channel_id: &str,
        original_id: Uuid,
        new_url: impl Into<String>,
        variation_label: impl Into<String>,
    ) -> Result<AssetRecord> {
        let original = self
            .get_asset(channel_id, original_id)
            .await?
            .ok_or_else(|| {
                ProductionError::Persistence(newsreel_storage::StorageError::record_not_found(
                    channel_id,
                    record_key(original_id),
                ))
            })?;

        let version = AssetRecord {
            id: Uuid::new_v4(),
            asset_type: original.asset_type,
            url: new_url.into(),
            channel_id: original.channel_id.clone(),
            production_id: None,
            dialogue_text: original.dialogue_text.clone(),
            scene_type: original.scene_type.clone(),
            shot_type: original.shot_type.clone(),
            duration_secs: original.duration_secs,
            resolution: original.resolution.clone(),
            aspect_ratio: original.aspect_ratio.clone(),
            use_count: 0,
            created_at: Utc::now(),
            last_used_at: None,
            original_asset_id: Some(original.id),
            variation_label: Some(variation_label.into()),
        };

        self.register_asset(&version).await?;
        Ok(version)
    }
}
