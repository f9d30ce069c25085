use crate::api::DurationProbe;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let probe = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(PROBE_TIMEOUT, probe)
        .await
        .map_err(|_| anyhow::anyhow!("ffprobe timed out on {}", path.display()))?
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    parse_duration(&text)
}

fn parse_duration(text: &str) -> Result<f64> {
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if !duration.is_finite() || duration <= 0.0 {
        return Err(anyhow::anyhow!("Invalid duration: {:?}", text));
    }
    Ok(duration)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ffprobe;

#[async_trait]
impl DurationProbe for Ffprobe {
    async fn duration_seconds(&self, path: &Path) -> Result<f64> {
        ffprobe_duration_seconds(path).await
    }
}

pub fn silence_file_name(gap_seconds: f64) -> String {
    format!("silence_{}s.wav", gap_seconds)
}

/// Shell line that renders the inter-story silence.
pub fn silence_command(gap_seconds: f64) -> String {
    format!(
        "ffmpeg -f lavfi -i anullsrc=r=44100:cl=stereo -t {} -acodec mp3 {}",
        gap_seconds,
        silence_file_name(gap_seconds)
    )
}

/// Shell line that joins a concat playlist into one narration track.
pub fn concat_command(playlist: &str, out_file: &str) -> String {
    format!("ffmpeg -f concat -safe 0 -i {} -c copy {}", playlist, out_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_output() {
        assert_eq!(parse_duration("1342.616000").unwrap(), 1342.616);
        assert!(parse_duration("N/A").is_err());
        assert!(parse_duration("0.0").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn silence_names_follow_gap() {
        assert_eq!(silence_file_name(45.0), "silence_45s.wav");
        assert_eq!(silence_file_name(2.5), "silence_2.5s.wav");
        assert!(silence_command(45.0).ends_with("-t 45 -acodec mp3 silence_45s.wav"));
    }
}
