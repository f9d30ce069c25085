use crate::api::SpeechSynthesizer;
use crate::api::claude::ClaudeCli;
use crate::config::Config;
use crate::{logi, logok, logw};
use anyhow::Result;
use tokio::fs;

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in [cfg.audio_dir.as_path(), cfg.output_root.as_path()] {
        if !dir.exists() {
            fs::create_dir_all(dir).await?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Which external tools a run needs.
#[derive(Debug, Clone, Copy)]
pub struct Requirements {
    pub story_cli: bool,
    pub speech: bool,
}

/// Probes the story CLI, the speech service and ffmpeg. Logs every missing
/// piece before failing.
pub async fn check_prerequisites(
    claude: &ClaudeCli,
    tts: &dyn SpeechSynthesizer,
    cfg: &Config,
    needs: Requirements,
) -> Result<()> {
    logi("Checking prerequisites...");
    let mut missing = Vec::new();

    if needs.story_cli {
        match claude.version().await {
            Some(v) => logok(format!("Story CLI: {}", v)),
            None => {
                logw(format!("{} CLI not found in PATH", claude.bin));
                missing.push(claude.bin.clone());
            }
        }
    }

    if needs.speech {
        if tts.is_available().await {
            logok(format!("Kokoro-FastAPI running at {}", cfg.kokoro_url));
        } else {
            logw(format!(
                "Kokoro-FastAPI not running at {}. Start with: docker run -d -p 8880:8880 --name kokoro-full ghcr.io/remsky/kokoro-fastapi-cpu:latest",
                cfg.kokoro_url
            ));
            missing.push("kokoro".to_string());
        }

        if check_ffmpeg().await {
            logok("FFmpeg available");
        } else {
            logw("FFmpeg not found in PATH. Please install FFmpeg.");
            missing.push("ffmpeg".to_string());
        }
    }

    if !missing.is_empty() {
        anyhow::bail!("Missing prerequisites: {}", missing.join(", "));
    }
    logok("All prerequisites met");
    Ok(())
}
