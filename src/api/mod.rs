//! External collaborators: the story-writing CLI, the speech service, and the
//! duration probe. Orchestration only talks to them through these traits.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub mod claude;
pub mod kokoro;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn is_available(&self) -> bool;

    /// Writes narration for `text` to `out_path`. `Ok(false)` means the service
    /// answered but refused; transport failures are errors.
    async fn synthesize(&self, text: &str, voice: &str, out_path: &Path) -> Result<bool>;
}

#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn duration_seconds(&self, path: &Path) -> Result<f64>;
}
