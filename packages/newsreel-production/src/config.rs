use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Channel-level production configuration.
///
/// Everything a stage needs to parameterize generation: voices per
/// speaker, output format, framing for asset matching, cache TTLs and
/// thresholds, and the cost weights recorded on cache entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionConfig {
    /// Content topic, folded into prompts and cache key classes.
    pub topic: String,
    pub country: String,
    pub aspect_ratio: String,
    pub resolution: String,

    /// Speaker name -> provider voice id.
    pub voices: BTreeMap<String, String>,
    pub default_voice: String,

    /// Framing attributes used when matching reusable assets.
    pub dialogue_scene_type: String,
    pub dialogue_shot_type: String,
    pub background_scene_type: String,

    pub max_thumbnails: usize,

    pub script_ttl_secs: i64,
    pub metadata_ttl_secs: i64,
    pub media_ttl_secs: i64,

    /// Acceptance threshold for fuzzy cache hits on the generation path.
    pub fuzzy_threshold: f64,
    pub min_asset_similarity: f64,

    // Cost weights recorded on cache entries, in provider-billing units.
    pub script_cost: f64,
    pub audio_cost: f64,
    pub video_cost: f64,
    pub metadata_cost: f64,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            topic: "news".to_string(),
            country: "US".to_string(),
            aspect_ratio: "16:9".to_string(),
            resolution: "720p".to_string(),
            voices: BTreeMap::new(),
            default_voice: "narrator-1".to_string(),
            dialogue_scene_type: "news_desk".to_string(),
            dialogue_shot_type: "medium_closeup".to_string(),
            background_scene_type: "wide_establishing".to_string(),
            max_thumbnails: 2,
            script_ttl_secs: 24 * 3600,
            metadata_ttl_secs: 24 * 3600,
            media_ttl_secs: 7 * 24 * 3600,
            fuzzy_threshold: 0.85,
            min_asset_similarity: 0.6,
            script_cost: 2.0,
            audio_cost: 0.5,
            video_cost: 5.0,
            metadata_cost: 1.0,
        }
    }
}

impl ProductionConfig {
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_format(
        mut self,
        aspect_ratio: impl Into<String>,
        resolution: impl Into<String>,
    ) -> Self {
        self.aspect_ratio = aspect_ratio.into();
        self.resolution = resolution.into();
        self
    }

    pub fn with_voice(mut self, speaker: impl Into<String>, voice_id: impl Into<String>) -> Self {
        self.voices.insert(speaker.into(), voice_id.into());
        self
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn voice_for(&self, speaker: &str) -> &str {
        self.voices
            .get(speaker)
            .map(String::as_str)
            .unwrap_or(&self.default_voice)
    }

    pub fn script_ttl(&self) -> Duration {
        Duration::seconds(self.script_ttl_secs)
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::seconds(self.metadata_ttl_secs)
    }

    pub fn media_ttl(&self) -> Duration {
        Duration::seconds(self.media_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_fallback() {
        let config = ProductionConfig::default()
            .with_voice("anchor", "voice-a")
            .with_voice("analyst", "voice-b");

        assert_eq!(config.voice_for("anchor"), "voice-a");
        assert_eq!(config.voice_for("analyst"), "voice-b");
        assert_eq!(config.voice_for("guest"), "narrator-1");
    }

    #[test]
    fn test_builders() {
        let config = ProductionConfig::default()
            .with_topic("finance")
            .with_country("JP")
            .with_format("9:16", "1080p")
            .with_fuzzy_threshold(0.9);

        assert_eq!(config.topic, "finance");
        assert_eq!(config.country, "JP");
        assert_eq!(config.aspect_ratio, "9:16");
        assert_eq!(config.resolution, "1080p");
        assert!((config.fuzzy_threshold - 0.9).abs() < 1e-10);
    }

    #[test]
    fn test_ttl_accessors() {
        let config = ProductionConfig::default();
        assert_eq!(config.script_ttl(), Duration::hours(24));
        assert_eq!(config.media_ttl(), Duration::days(7));
    }
}
