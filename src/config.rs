use crate::error::SelectionError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub kokoro_url: String,
    pub voice: String,
    pub claude_bin: String,
    pub claude_model: String,
    pub target_minutes: f64,
    pub story_gap_seconds: f64,
    pub target_stories: usize,
    pub buffer_stories: usize,
    pub story_delay_seconds: u64,
    pub synthesis_delay_seconds: u64,
    pub audio_dir: PathBuf,
    pub output_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kokoro_url: "http://localhost:8880".to_string(),
            voice: "af_sarah".to_string(),
            claude_bin: "claude".to_string(),
            claude_model: "opus".to_string(),
            target_minutes: 180.0,
            story_gap_seconds: 45.0,
            target_stories: 8,
            buffer_stories: 3,
            story_delay_seconds: 3,
            synthesis_delay_seconds: 2,
            audio_dir: PathBuf::from("audio"),
            output_root: PathBuf::from("compilations"),
        }
    }
}

impl Config {
    /// Reads `path` if it exists, otherwise falls back to defaults.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if fs::metadata(path).await.is_err() {
            let config = Config::default();
            config.validate()?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SelectionError> {
        if !self.target_minutes.is_finite() || self.target_minutes <= 0.0 {
            return Err(SelectionError::InvalidConfiguration(
                "config.json: target_minutes must be positive".to_string(),
            ));
        }
        if !self.story_gap_seconds.is_finite() || self.story_gap_seconds < 0.0 {
            return Err(SelectionError::InvalidConfiguration(
                "config.json: story_gap_seconds must not be negative".to_string(),
            ));
        }
        if self.target_stories < 1 {
            return Err(SelectionError::InvalidConfiguration(
                "config.json: target_stories must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn target_seconds(&self) -> f64 {
        self.target_minutes * 60.0
    }
}
