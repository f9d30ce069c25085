use super::SpeechSynthesizer;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Kokoro-FastAPI speaking the OpenAI `audio/speech` dialect.
#[derive(Debug, Clone)]
pub struct KokoroClient {
    client: Client,
    base_url: String,
}

impl KokoroClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SpeechSynthesizer for KokoroClient {
    async fn is_available(&self) -> bool {
        let url = format!("{}/docs", self.base_url);
        match self
            .client
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn synthesize(&self, text: &str, voice: &str, out_path: &Path) -> Result<bool> {
        let url = format!("{}/v1/audio/speech", self.base_url);

        let body = serde_json::json!({
            "model": "kokoro",
            "input": text,
            "voice": voice,
            "response_format": "mp3",
            "speed": 1.0,
        });

        let resp = self
            .client
            .post(url)
            .json(&body)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .context("Kokoro request failed")?;

        if !resp.status().is_success() {
            logw(format!("Kokoro TTS failed HTTP {}", resp.status().as_u16()));
            return Ok(false);
        }

        let bytes = resp.bytes().await.context("Kokoro response read failed")?;
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        fs::write(out_path, &bytes).await?;

        Ok(fs::metadata(out_path).await.is_ok())
    }
}
