use crate::api::{DurationProbe, SpeechSynthesizer};
use crate::config::Config;
use crate::generator::Compilation;
use crate::report::{self, FinalCompilation};
use crate::selector::{self, Candidate};
use crate::timeline;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Measured narration for one story.
#[derive(Debug, Clone)]
pub struct AudioStory {
    pub story_number: u32,
    pub audio_path: PathBuf,
    pub duration_seconds: f64,
}

impl AudioStory {
    pub fn to_candidate(&self, title: &str) -> Candidate {
        Candidate::new(self.story_number, title, self.duration_seconds)
            .with_audio_path(self.audio_path.clone())
    }
}

pub struct LengthManager<'a> {
    tts: &'a dyn SpeechSynthesizer,
    probe: &'a dyn DurationProbe,
    cfg: &'a Config,
}

impl<'a> LengthManager<'a> {
    pub fn new(tts: &'a dyn SpeechSynthesizer, probe: &'a dyn DurationProbe, cfg: &'a Config) -> Self {
        Self { tts, probe, cfg }
    }

    /// Narrates every story and measures the result. Stories whose synthesis
    /// or measurement fails are dropped.
    pub async fn generate_audio_batch(&self, compilation: &Compilation) -> Result<Vec<AudioStory>> {
        if !self.tts.is_available().await {
            anyhow::bail!(
                "Speech service not reachable at {}. Start it with: docker run -d -p 8880:8880 --name kokoro-full ghcr.io/remsky/kokoro-fastapi-cpu:latest",
                self.cfg.kokoro_url
            );
        }

        let total = compilation.stories.len();
        logi(format!("Generating audio for {} stories (voice {})...", total, self.cfg.voice));

        let audio_dir = self.audio_dir_for(compilation);
        let mut out = Vec::with_capacity(total);
        for (i, story) in compilation.stories.iter().enumerate() {
            let title: String = story.concept.title.chars().take(30).collect();
            logi(format!("Processing story {}/{}: {}...", i + 1, total, title));

            let audio_path = audio_dir.join(format!("story_{:02}_audio.mp3", story.story_number));

            match self.measure_one(&story.content, &audio_path).await {
                Ok(duration) => {
                    logok(format!("Generated: {:.1} minutes", duration / 60.0));
                    out.push(AudioStory {
                        story_number: story.story_number,
                        audio_path,
                        duration_seconds: duration,
                    });
                }
                Err(err) => logw(format!("Story {} skipped: {:#}", story.story_number, err)),
            }

            if i + 1 < total && self.cfg.synthesis_delay_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(self.cfg.synthesis_delay_seconds)).await;
            }
        }

        Ok(out)
    }

    /// Narration for each compilation lives in its own subdirectory so earlier
    /// playlists keep pointing at their own audio.
    pub fn audio_dir_for(&self, compilation: &Compilation) -> PathBuf {
        self.cfg.audio_dir.join(&compilation.name)
    }

    async fn measure_one(&self, text: &str, audio_path: &Path) -> Result<f64> {
        if !self.tts.synthesize(text, &self.cfg.voice, audio_path).await? {
            anyhow::bail!("synthesis refused");
        }
        self.probe
            .duration_seconds(audio_path)
            .await
            .context("Could not measure audio duration")
    }

    /// Full adaptive pass: narrate, pick the best `target_stories`, and write
    /// the final compilation under `base_dir`.
    pub async fn process_compilation(
        &self,
        compilation: &Compilation,
        base_dir: &Path,
    ) -> Result<(PathBuf, FinalCompilation)> {
        logi(format!(
            "Adaptive length management: {} stories in, target {:.1} minutes",
            compilation.stories.len(),
            self.cfg.target_minutes
        ));

        let audio = self.generate_audio_batch(compilation).await?;
        if audio.is_empty() {
            anyhow::bail!("No audio stories generated");
        }

        let final_compilation = select_final(compilation, &audio, self.cfg)?;
        let dir = report::save_final_compilation(&final_compilation, base_dir).await?;
        logok(format!("Final compilation saved to {}", dir.display()));
        Ok((dir, final_compilation))
    }
}

/// Runs the optimizer over measured stories and lays out the winners.
pub fn select_final(
    compilation: &Compilation,
    audio: &[AudioStory],
    cfg: &Config,
) -> Result<FinalCompilation> {
    let candidates: Vec<Candidate> = audio
        .iter()
        .filter_map(|a| {
            compilation
                .stories
                .iter()
                .find(|s| s.story_number == a.story_number)
                .map(|s| a.to_candidate(&s.concept.title))
        })
        .collect();

    logi(format!(
        "Finding optimal combination of {} stories from {} available...",
        cfg.target_stories,
        candidates.len()
    ));

    let selection = selector::select(
        &candidates,
        cfg.target_stories,
        cfg.target_seconds(),
        cfg.story_gap_seconds,
    )?;

    logok(format!(
        "Optimal combination: target {:.1} min, achieved {:.1} min, difference {:+.1} min ({} subsets)",
        selection.target_seconds / 60.0,
        selection.achieved_seconds / 60.0,
        selection.difference_seconds / 60.0,
        selection.subsets_evaluated
    ));

    let timeline = timeline::build_timeline(&selection.selected, selection.gap_seconds);
    Ok(FinalCompilation::from_selection(compilation, &selection, &timeline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SelectionError;
    use crate::story::tests::concept;
    use crate::story::{CompilationTheme, Story};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Writes the story text itself as the "audio" file.
    struct FakeTts {
        up: bool,
        refuse: Vec<String>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeTts {
        async fn is_available(&self) -> bool {
            self.up
        }

        async fn synthesize(&self, text: &str, _voice: &str, out_path: &Path) -> Result<bool> {
            if self.refuse.iter().any(|r| r == text) {
                return Ok(false);
            }
            if let Some(parent) = out_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(out_path, text.as_bytes()).await?;
            Ok(true)
        }
    }

    struct FakeProbe {
        durations: HashMap<String, f64>,
    }

    #[async_trait]
    impl DurationProbe for FakeProbe {
        async fn duration_seconds(&self, path: &Path) -> Result<f64> {
            let text = tokio::fs::read_to_string(path).await?;
            self.durations
                .get(&text)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("unmeasurable"))
        }
    }

    fn compilation(durations: &[f64]) -> (Compilation, HashMap<String, f64>) {
        named_compilation("creative_horror_compilation_test", durations)
    }

    fn named_compilation(name: &str, durations: &[f64]) -> (Compilation, HashMap<String, f64>) {
        let mut map = HashMap::new();
        let stories: Vec<Story> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let n = i as u32 + 1;
                let content = format!("story body {}", n);
                map.insert(content.clone(), *d);
                Story {
                    story_number: n,
                    concept: concept(n, &format!("Story {}", n)),
                    generated_at: "2025-01-01T00:00:00".to_string(),
                    word_count: 3,
                    content,
                    model: "opus".to_string(),
                }
            })
            .collect();
        let theme = CompilationTheme {
            compilation_theme: "t".to_string(),
            compilation_title: "T".to_string(),
            theme_description: String::new(),
            story_concepts: stories.iter().map(|s| s.concept.clone()).collect(),
        };
        (
            Compilation::new(name.to_string(), theme, 2, 2, stories),
            map,
        )
    }

    fn cfg(audio_dir: &Path) -> Config {
        Config {
            target_minutes: 25.0,
            story_gap_seconds: 0.0,
            target_stories: 2,
            synthesis_delay_seconds: 0,
            audio_dir: audio_dir.to_path_buf(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn selects_and_writes_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let (comp, durations) = compilation(&[700.0, 800.0, 750.0, 790.0]);
        let tts = FakeTts { up: true, refuse: vec![] };
        let probe = FakeProbe { durations };
        let cfg = cfg(&tmp.path().join("audio"));

        let manager = LengthManager::new(&tts, &probe, &cfg);
        let (dir, fc) = manager.process_compilation(&comp, tmp.path()).await.unwrap();

        let picked: Vec<u32> = fc.stories.iter().map(|s| s.original_story_number).collect();
        assert_eq!(picked, vec![1, 2]);
        assert_eq!(fc.actual_duration_seconds, 1500.0);
        assert_eq!(fc.duration_difference_seconds, 0.0);
        assert!(dir.join(report::METADATA_FILE).is_file());
        assert!(
            tmp.path()
                .join("audio/creative_horror_compilation_test/story_01_audio.mp3")
                .is_file()
        );
    }

    #[tokio::test]
    async fn failed_stories_are_dropped_from_the_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let (comp, mut durations) = compilation(&[700.0, 800.0, 750.0, 790.0]);
        durations.remove("story body 2");
        let tts = FakeTts {
            up: true,
            refuse: vec!["story body 1".to_string()],
        };
        let probe = FakeProbe { durations };
        let cfg = cfg(&tmp.path().join("audio"));

        let manager = LengthManager::new(&tts, &probe, &cfg);
        let audio = manager.generate_audio_batch(&comp).await.unwrap();
        let numbers: Vec<u32> = audio.iter().map(|a| a.story_number).collect();
        assert_eq!(numbers, vec![3, 4]);

        let fc = select_final(&comp, &audio, &cfg).unwrap();
        assert_eq!(fc.actual_duration_seconds, 1540.0);
        assert_eq!(fc.duration_difference_seconds, 40.0);
    }

    #[tokio::test]
    async fn compilations_keep_separate_audio() {
        let tmp = tempfile::tempdir().unwrap();
        let (first, durations) = named_compilation("creative_horror_compilation_a", &[700.0, 800.0]);
        let (second, _) = named_compilation("creative_horror_compilation_b", &[700.0, 800.0]);
        let tts = FakeTts { up: true, refuse: vec![] };
        let probe = FakeProbe { durations };
        let cfg = cfg(&tmp.path().join("audio"));
        let manager = LengthManager::new(&tts, &probe, &cfg);

        let a = manager.generate_audio_batch(&first).await.unwrap();
        let b = manager.generate_audio_batch(&second).await.unwrap();
        assert_ne!(a[0].audio_path, b[0].audio_path);
        assert!(a[0].audio_path.starts_with(tmp.path().join("audio/creative_horror_compilation_a")));
        assert!(a[0].audio_path.is_file());
        assert!(b[0].audio_path.is_file());
    }

    #[test]
    fn too_few_measured_stories_is_an_error() {
        let (comp, _) = compilation(&[600.0, 700.0]);
        let audio = vec![AudioStory {
            story_number: 1,
            audio_path: PathBuf::from("a.mp3"),
            duration_seconds: 600.0,
        }];
        let cfg = cfg(Path::new("audio"));
        let err = select_final(&comp, &audio, &cfg).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SelectionError>(),
            Some(&SelectionError::InsufficientCandidates {
                available: 1,
                required: 2
            })
        );
    }

    #[tokio::test]
    async fn service_down_fails_the_phase() {
        let (comp, durations) = compilation(&[600.0, 700.0]);
        let tts = FakeTts { up: false, refuse: vec![] };
        let probe = FakeProbe { durations };
        let cfg = cfg(Path::new("audio"));
        let manager = LengthManager::new(&tts, &probe, &cfg);
        assert!(manager.generate_audio_batch(&comp).await.is_err());
    }
}
