//! External provider ports: AI generation and blob storage.
//!
//! The pipeline never talks to a concrete model or bucket; it drives
//! these traits. Providers signal failure through
//! `ProductionError::Generation` and the core performs no retries;
//! retry policy belongs to the caller.

use crate::config::ProductionConfig;
use crate::error::Result;
use crate::job::{ScriptLine, SourceItem, ViralMetadata};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Synthesized speech for one script line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAudio {
    pub bytes: Vec<u8>,
    pub duration_secs: f64,
}

/// External AI generation capability.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Write the dialogue script for the selected items, opening with the
    /// given hook.
    async fn generate_script(
        &self,
        selection: &[SourceItem],
        config: &ProductionConfig,
        hook: &str,
    ) -> Result<Vec<ScriptLine>>;

    /// Produce the viral hook line for this selection. Regenerated even
    /// when a persisted script is reused, to keep metadata consistent.
    async fn generate_hook(
        &self,
        selection: &[SourceItem],
        config: &ProductionConfig,
    ) -> Result<String>;

    /// Synthesize speech for one line with the given voice.
    async fn generate_audio(&self, line: &ScriptLine, voice_id: &str) -> Result<GeneratedAudio>;

    /// Generate a video clip for a prompt; returns the clip URI.
    async fn generate_video(&self, prompt: &str) -> Result<String>;

    /// Title, description and tags for publishing.
    async fn generate_metadata(
        &self,
        selection: &[SourceItem],
        config: &ProductionConfig,
        date_key: &str,
    ) -> Result<ViralMetadata>;

    /// Generate one thumbnail variant for a title; returns the image URI.
    async fn generate_thumbnail(&self, title: &str, config: &ProductionConfig) -> Result<String>;
}

/// External blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<String>;

    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    async fn delete(&self, paths: &[String]) -> Result<()>;
}
