use crate::api::{DurationProbe, SpeechSynthesizer, TextGenerator};
use crate::config::Config;
use crate::generator::{self, Compilation, CreativeGenerator, METADATA_FILE};
use crate::length::LengthManager;
use crate::report::{FinalCompilation, ProductionSummary};
use crate::{logi, logok};
use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};

/// Result of a completed run, pointing at the written `final_compilation/`.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub final_dir: PathBuf,
    pub final_compilation: FinalCompilation,
}

pub struct ProductionPipeline<'a> {
    llm: &'a dyn TextGenerator,
    tts: &'a dyn SpeechSynthesizer,
    probe: &'a dyn DurationProbe,
    cfg: Config,
}

impl<'a> ProductionPipeline<'a> {
    pub fn new(
        llm: &'a dyn TextGenerator,
        tts: &'a dyn SpeechSynthesizer,
        probe: &'a dyn DurationProbe,
        cfg: Config,
    ) -> Self {
        Self { llm, tts, probe, cfg }
    }

    /// Phase 1 only: writes the compilation directory and returns it.
    pub async fn generate(&self, target_stories: usize, buffer_stories: usize) -> Result<(PathBuf, Compilation)> {
        let compilation = CreativeGenerator::new(self.llm, &self.cfg)
            .generate_compilation(target_stories, buffer_stories)
            .await
            .context("Creative story generation failed")?;
        let dir = generator::save_compilation(&compilation, &self.cfg.output_root).await?;
        Ok((dir, compilation))
    }

    /// Phase 2 only, over an already generated compilation directory.
    pub async fn optimize(
        &self,
        compilation: &Compilation,
        compilation_dir: &Path,
        target_stories: usize,
    ) -> Result<PipelineOutcome> {
        let cfg = Config {
            target_stories,
            ..self.cfg.clone()
        };
        cfg.validate()?;

        let (final_dir, final_compilation) = LengthManager::new(self.tts, self.probe, &cfg)
            .process_compilation(compilation, compilation_dir)
            .await
            .context("Adaptive length management failed")?;
        Ok(PipelineOutcome {
            final_dir,
            final_compilation,
        })
    }

    /// Loads `metadata` (or the newest compilation under the output root) and
    /// runs phase 2 on it. Without an override, the compilation's own story
    /// target decides `k`.
    pub async fn optimize_existing(
        &self,
        metadata: Option<&Path>,
        target_stories: Option<usize>,
    ) -> Result<PipelineOutcome> {
        let metadata = match metadata {
            Some(p) => p.to_path_buf(),
            None => generator::find_latest_compilation(&self.cfg.output_root)
                .map(|d| d.join(METADATA_FILE))
                .with_context(|| {
                    format!(
                        "No creative compilations found under {}",
                        self.cfg.output_root.display()
                    )
                })?,
        };
        let dir = metadata
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        logi(format!("Processing compilation: {}", metadata.display()));
        let compilation = Compilation::load(&metadata).await?;
        let target = target_stories
            .or(Some(compilation.target_stories).filter(|n| *n > 0))
            .unwrap_or(self.cfg.target_stories);
        self.optimize(&compilation, &dir, target).await
    }

    /// Generation, length optimization and the production summary.
    pub async fn run_full(&self, target_stories: usize, buffer_stories: usize) -> Result<PipelineOutcome> {
        let started = Local::now();
        let pipeline_name = format!("horror_production_{}", started.format("%Y%m%d_%H%M%S"));
        logi(format!(
            "{}: {} stories for a {:.0}-minute compilation, {} buffer",
            pipeline_name, target_stories, self.cfg.target_minutes, buffer_stories
        ));

        logi("PHASE 1: CREATIVE STORY GENERATION");
        let (dir, compilation) = self.generate(target_stories, buffer_stories).await?;
        logok(format!("Phase 1 complete: {} stories generated", compilation.stories.len()));

        logi("PHASE 2: ADAPTIVE LENGTH MANAGEMENT");
        let outcome = self.optimize(&compilation, &dir, target_stories).await?;
        logok("Phase 2 complete: optimized compilation ready");

        let finished = Local::now();
        let summary = ProductionSummary::new(&pipeline_name, started, finished, &outcome.final_compilation);
        summary.save(&outcome.final_dir).await?;

        let fc = &outcome.final_compilation;
        logok(format!("Final Duration: {:.1} minutes", fc.actual_duration_seconds / 60.0));
        logok(format!(
            "Target Accuracy: {}",
            summary.final_compilation.duration_accuracy
        ));
        logok(format!("Stories Selected: {}", fc.selected_stories_count));
        logok(format!("Ad Opportunities: {}", summary.youtube_optimization.ad_placement_opportunities));
        logok(format!(
            "Pipeline complete in {:.1} minutes: {}",
            summary.total_production_time_minutes,
            outcome.final_dir.display()
        ));

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{self, SUMMARY_FILE};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Llm;

    #[async_trait]
    impl TextGenerator for Llm {
        async fn generate(&self, prompt: &str, _timeout: Duration) -> Result<String> {
            if prompt.starts_with("Create a horror compilation theme") {
                let concepts: Vec<String> = (1..=4)
                    .map(|i| {
                        format!(
                            r#"{{"concept_id":{i},"title":"Shift {i}","job":"guard","workplace":"site {i}","horror_element":"h","unique_hook":"u"}}"#
                        )
                    })
                    .collect();
                return Ok(format!(
                    r#"{{"compilation_theme":"night","compilation_title":"Night","story_concepts":[{}]}}"#,
                    concepts.join(",")
                ));
            }
            if prompt.starts_with("Evaluate and rank") {
                return Ok(r#"{"production_recommendations":{"top_concepts":[1,2,3,4]}}"#.to_string());
            }
            // Story length is encoded in the workplace name.
            let n = prompt
                .split("at site ")
                .nth(1)
                .and_then(|rest| rest.chars().next())
                .and_then(|c| c.to_digit(10))
                .unwrap_or(0);
            Ok(format!("site {}", n))
        }
    }

    struct Tts;

    #[async_trait]
    impl SpeechSynthesizer for Tts {
        async fn is_available(&self) -> bool {
            true
        }

        async fn synthesize(&self, text: &str, _voice: &str, out_path: &Path) -> Result<bool> {
            tokio::fs::create_dir_all(out_path.parent().unwrap()).await?;
            tokio::fs::write(out_path, text).await?;
            Ok(true)
        }
    }

    struct Probe;

    #[async_trait]
    impl DurationProbe for Probe {
        async fn duration_seconds(&self, path: &Path) -> Result<f64> {
            let text = tokio::fs::read_to_string(path).await?;
            let durations = [0.0, 700.0, 800.0, 750.0, 790.0];
            let n: usize = text.trim_start_matches("site ").parse()?;
            Ok(durations[n])
        }
    }

    fn cfg(root: &Path) -> Config {
        Config {
            target_minutes: 25.0,
            story_gap_seconds: 0.0,
            target_stories: 2,
            story_delay_seconds: 0,
            synthesis_delay_seconds: 0,
            audio_dir: root.join("audio"),
            output_root: root.join("compilations"),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn full_run_writes_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = ProductionPipeline::new(&Llm, &Tts, &Probe, cfg(tmp.path()));
        let outcome = pipeline.run_full(2, 2).await.unwrap();

        let picked: Vec<u32> = outcome
            .final_compilation
            .stories
            .iter()
            .map(|s| s.original_story_number)
            .collect();
        assert_eq!(picked, vec![1, 2]);
        assert_eq!(outcome.final_compilation.actual_duration_seconds, 1500.0);
        assert!(outcome.final_dir.join(SUMMARY_FILE).is_file());
        assert!(outcome.final_dir.join(report::PLAYLIST_FILE).is_file());
    }

    #[tokio::test]
    async fn optimize_existing_picks_latest() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = ProductionPipeline::new(&Llm, &Tts, &Probe, cfg(tmp.path()));
        let (dir, _) = pipeline.generate(2, 2).await.unwrap();

        let outcome = pipeline.optimize_existing(None, None).await.unwrap();
        assert_eq!(outcome.final_dir, dir.join(report::FINAL_DIR));
        assert_eq!(outcome.final_compilation.duration_difference_seconds, 0.0);
    }

    #[tokio::test]
    async fn optimize_existing_without_compilations_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = ProductionPipeline::new(&Llm, &Tts, &Probe, cfg(tmp.path()));
        assert!(pipeline.optimize_existing(None, None).await.is_err());
    }
}
