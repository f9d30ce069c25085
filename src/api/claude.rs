use super::TextGenerator;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs `claude --print --model <model>` with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    pub bin: String,
    pub model: String,
}

impl ClaudeCli {
    pub fn new(bin: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            model: model.into(),
        }
    }

    pub async fn version(&self) -> Option<String> {
        let output = Command::new(&self.bin).arg("--version").output().await.ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(&self, prompt: &str) -> Result<String> {
        let mut child = Command::new(&self.bin)
            .args(["--print", "--model", self.model.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.bin))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Story CLI execution failed")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            logw(format!("{} exited with {}: {}", self.bin, output.status, stderr.trim()));
            anyhow::bail!("{} failed with {}", self.bin, output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl TextGenerator for ClaudeCli {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, self.run(prompt)).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("{} timed out after {}s", self.bin, timeout.as_secs()),
        }
    }
}
