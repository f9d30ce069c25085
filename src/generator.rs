use crate::api::TextGenerator;
use crate::config::Config;
use crate::story::{
    self, CompilationTheme, ConceptEvaluation, Story, StoryConcept, parse_model_json,
};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use walkdir::WalkDir;

pub const COMPILATION_PREFIX: &str = "creative_horror_compilation";
pub const METADATA_FILE: &str = "creative_compilation_metadata.json";

const FALLBACK_CONCEPTS: usize = 10;
const THEME_TIMEOUT: Duration = Duration::from_secs(60);
const EVALUATION_TIMEOUT: Duration = Duration::from_secs(90);
const STORY_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compilation {
    pub name: String,
    pub theme_data: CompilationTheme,
    pub generated_at: String,
    pub target_stories: usize,
    pub buffer_stories: usize,
    pub total_generated: usize,
    pub total_words: usize,
    pub estimated_runtime_minutes: u32,
    pub stories: Vec<Story>,
}

impl Compilation {
    pub fn new(
        name: String,
        theme_data: CompilationTheme,
        target_stories: usize,
        buffer_stories: usize,
        stories: Vec<Story>,
    ) -> Self {
        Self {
            name,
            theme_data,
            generated_at: Local::now().to_rfc3339(),
            target_stories,
            buffer_stories,
            total_generated: stories.len(),
            total_words: stories.iter().map(|s| s.word_count).sum(),
            estimated_runtime_minutes: stories
                .iter()
                .map(|s| s.concept.estimated_minutes_upper())
                .sum(),
            stories,
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read compilation: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse compilation: {}", path.display()))
    }
}

/// Most recently named compilation directory under `root` that carries a
/// metadata file. Names embed a sortable timestamp.
pub fn find_latest_compilation(root: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter(|e| e.file_name().to_string_lossy().starts_with(COMPILATION_PREFIX))
        .map(|e| e.into_path())
        .filter(|p| p.join(METADATA_FILE).is_file())
        .collect();
    dirs.sort();
    dirs.pop()
}

pub struct CreativeGenerator<'a> {
    llm: &'a dyn TextGenerator,
    cfg: &'a Config,
}

impl<'a> CreativeGenerator<'a> {
    pub fn new(llm: &'a dyn TextGenerator, cfg: &'a Config) -> Self {
        Self { llm, cfg }
    }

    pub async fn generate_theme(&self, concept_count: usize) -> Result<CompilationTheme> {
        logi(format!("Generating compilation theme with {} story concepts...", concept_count));
        let reply = self
            .llm
            .generate(&story::theme_prompt(concept_count), THEME_TIMEOUT)
            .await
            .context("Theme generation failed")?;
        let theme: CompilationTheme = parse_model_json(&reply)?;
        if theme.story_concepts.is_empty() {
            anyhow::bail!("Theme reply contained no story concepts");
        }
        logok(format!(
            "Generated theme: {} ({} concepts)",
            theme.compilation_title,
            theme.story_concepts.len()
        ));
        Ok(theme)
    }

    /// Ranks concepts through the model. Falls back to the first concepts in
    /// theme order when the evaluation is unusable.
    pub async fn evaluate_concepts(&self, theme: &CompilationTheme) -> Vec<StoryConcept> {
        let fallback = || -> Vec<StoryConcept> {
            theme
                .story_concepts
                .iter()
                .take(FALLBACK_CONCEPTS)
                .cloned()
                .collect()
        };

        logi("Evaluating story concepts for quality and selection...");
        let prompt = match story::evaluation_prompt(theme) {
            Ok(p) => p,
            Err(err) => {
                logw(format!("Evaluation prompt failed: {}", err));
                return fallback();
            }
        };

        let evaluation: ConceptEvaluation = match self
            .llm
            .generate(&prompt, EVALUATION_TIMEOUT)
            .await
            .and_then(|reply| parse_model_json::<ConceptEvaluation>(&reply))
        {
            Ok(e) => e,
            Err(err) => {
                logw(format!("Evaluation error: {:#}; using first {} concepts", err, FALLBACK_CONCEPTS));
                return fallback();
            }
        };

        let selected: Vec<StoryConcept> = evaluation
            .production_recommendations
            .top_concepts
            .iter()
            .filter_map(|id| theme.story_concepts.iter().find(|c| c.concept_id == *id))
            .cloned()
            .collect();

        if selected.is_empty() {
            logw("Evaluation named no known concepts; using theme order");
            return fallback();
        }

        logok(format!("Selected {} top concepts for production", selected.len()));
        selected
    }

    pub async fn generate_story(&self, concept: &StoryConcept, story_number: u32) -> Result<Story> {
        logi(format!("Generating story {}: {}...", story_number, concept.title));
        let content = self
            .llm
            .generate(&story::story_prompt(concept), STORY_TIMEOUT)
            .await
            .with_context(|| format!("Story {} generation failed", story_number))?;

        if content.trim().is_empty() {
            anyhow::bail!("No content generated for story {}", story_number);
        }

        let story = Story {
            story_number,
            concept: concept.clone(),
            generated_at: Local::now().to_rfc3339(),
            word_count: story::word_count(&content),
            content,
            model: self.cfg.claude_model.clone(),
        };
        logok(format!("Story {} generated ({} words)", story_number, story.word_count));
        Ok(story)
    }

    pub async fn generate_compilation(
        &self,
        target_stories: usize,
        buffer_stories: usize,
    ) -> Result<Compilation> {
        let name = format!("{}_{}", COMPILATION_PREFIX, Local::now().format("%Y%m%d_%H%M%S"));
        logi(format!(
            "Generating creative horror compilation {}: {} stories + {} buffer",
            name, target_stories, buffer_stories
        ));

        let theme = self.generate_theme(target_stories + buffer_stories).await?;
        let concepts = self.evaluate_concepts(&theme).await;
        let wanted = (target_stories + buffer_stories).min(concepts.len());

        let mut stories = Vec::with_capacity(wanted);
        for (i, concept) in concepts.iter().take(wanted).enumerate() {
            let number = i as u32 + 1;
            match self.generate_story(concept, number).await {
                Ok(story) => stories.push(story),
                Err(err) => logw(format!("{:#}", err)),
            }

            if i + 1 < wanted && self.cfg.story_delay_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(self.cfg.story_delay_seconds)).await;
            }
        }

        if stories.is_empty() {
            anyhow::bail!("No stories generated for {}", name);
        }

        Ok(Compilation::new(name, theme, target_stories, buffer_stories, stories))
    }
}

/// Writes one markdown file per story plus the metadata JSON into
/// `<root>/<name>/`.
pub async fn save_compilation(compilation: &Compilation, root: &Path) -> Result<PathBuf> {
    let dir = root.join(&compilation.name);
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create dir {}", dir.display()))?;

    for story in &compilation.stories {
        let path = dir.join(story.file_name());
        fs::write(&path, story.to_markdown())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let metadata = serde_json::to_string_pretty(compilation)?;
    fs::write(dir.join(METADATA_FILE), metadata).await?;
    logok(format!("Saved compilation to {}", dir.display()));
    Ok(dir)
}
