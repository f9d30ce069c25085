use crate::ffmpeg;
use crate::generator::Compilation;
use crate::selector::SelectionResult;
use crate::story::StoryConcept;
use crate::timeline::{Timeline, format_hms};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const FINAL_DIR: &str = "final_compilation";
pub const METADATA_FILE: &str = "final_compilation_metadata.json";
pub const PLAYLIST_FILE: &str = "compilation_playlist.txt";
pub const INSTRUCTIONS_FILE: &str = "assembly_instructions.md";
pub const SUMMARY_FILE: &str = "production_summary.json";
pub const OUTPUT_AUDIO_FILE: &str = "final_horror_compilation.mp3";

/// Seconds of runtime per mid-roll ad slot.
const AD_SLOT_SECONDS: f64 = 480.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalStory {
    pub compilation_position: usize,
    pub original_story_number: u32,
    pub title: String,
    pub audio_path: String,
    pub duration_seconds: f64,
    pub duration_minutes: f64,
    pub start_time_seconds: f64,
    pub start_time_formatted: String,
    pub end_time_seconds: f64,
    pub end_time_formatted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<StoryConcept>,
    pub word_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalCompilation {
    pub name: String,
    pub original_compilation: String,
    pub generated_at: String,
    pub selection_method: String,
    pub target_duration_seconds: f64,
    pub actual_duration_seconds: f64,
    pub duration_difference_seconds: f64,
    pub story_gap_seconds: f64,
    pub selected_stories_count: usize,
    pub total_story_duration: f64,
    pub total_gap_duration: f64,
    pub stories: Vec<FinalStory>,
}

impl FinalCompilation {
    pub fn from_selection(
        compilation: &Compilation,
        selection: &SelectionResult,
        timeline: &Timeline,
    ) -> Self {
        let stories = timeline
            .entries
            .iter()
            .map(|entry| {
                let c = &entry.candidate;
                let source = compilation
                    .stories
                    .iter()
                    .find(|s| s.story_number == c.id);
                FinalStory {
                    compilation_position: entry.position,
                    original_story_number: c.id,
                    title: c.title.clone(),
                    audio_path: c
                        .audio_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                    duration_seconds: c.duration_seconds,
                    duration_minutes: c.duration_seconds / 60.0,
                    start_time_seconds: entry.start_seconds,
                    start_time_formatted: entry.start_formatted(),
                    end_time_seconds: entry.end_seconds,
                    end_time_formatted: entry.end_formatted(),
                    concept: source.map(|s| s.concept.clone()),
                    word_count: source.map(|s| s.word_count).unwrap_or(0),
                }
            })
            .collect();

        Self {
            name: format!("{}_final", compilation.name),
            original_compilation: compilation.name.clone(),
            generated_at: Local::now().to_rfc3339(),
            selection_method: "adaptive_length_optimization".to_string(),
            target_duration_seconds: selection.target_seconds,
            actual_duration_seconds: selection.achieved_seconds,
            duration_difference_seconds: selection.difference_seconds,
            story_gap_seconds: selection.gap_seconds,
            selected_stories_count: selection.selected.len(),
            total_story_duration: selection.total_story_seconds(),
            total_gap_duration: selection.total_gap_seconds(),
            stories,
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

fn playlist_path(audio_path: &str, final_dir: &Path) -> String {
    pathdiff::diff_paths(audio_path, final_dir)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| audio_path.to_string())
}

/// ffmpeg concat list: every story followed by a silence entry, except the
/// last one.
pub fn render_playlist(fc: &FinalCompilation, final_dir: &Path) -> String {
    let mut out = String::new();
    out.push_str("# Final Horror Compilation Playlist\n");
    out.push_str(&format!("# Total Duration: {:.1} minutes\n", fc.actual_duration_seconds / 60.0));
    out.push_str(&format!("# Target: {:.1} minutes\n\n", fc.target_duration_seconds / 60.0));

    let last = fc.stories.len();
    for story in &fc.stories {
        out.push_str(&format!("# Story {}: {}\n", story.compilation_position, story.title));
        out.push_str(&format!(
            "# Start: {} | Duration: {:.1}min\n",
            story.start_time_formatted, story.duration_minutes
        ));
        out.push_str(&format!("file '{}'\n", playlist_path(&story.audio_path, final_dir)));
        if story.compilation_position < last {
            out.push_str(&format!("# Gap: {} seconds\n", fc.story_gap_seconds));
            out.push_str(&format!("file '{}'\n", ffmpeg::silence_file_name(fc.story_gap_seconds)));
        }
        out.push('\n');
    }
    out
}

pub fn render_instructions(fc: &FinalCompilation) -> String {
    let mut out = String::new();
    out.push_str("# Final Compilation Assembly Instructions\n\n");
    out.push_str("## Compilation Details\n");
    out.push_str(&format!("- **Total Duration**: {:.1} minutes\n", fc.actual_duration_seconds / 60.0));
    out.push_str(&format!("- **Target Duration**: {:.1} minutes\n", fc.target_duration_seconds / 60.0));
    out.push_str(&format!("- **Difference**: {:+.1} minutes\n", fc.duration_difference_seconds / 60.0));
    out.push_str(&format!("- **Stories**: {}\n", fc.selected_stories_count));
    out.push_str(&format!("- **Gap Between Stories**: {} seconds\n\n", fc.story_gap_seconds));

    out.push_str("## Story Timeline\n");
    for story in &fc.stories {
        out.push_str(&format!(
            "- **{}-{}**: {} ({:.1}min)\n",
            story.start_time_formatted, story.end_time_formatted, story.title, story.duration_minutes
        ));
    }

    out.push_str("\n## Assembly Commands\n");
    out.push_str("### Generate silence file:\n");
    out.push_str(&format!("```bash\n{}\n```\n\n", ffmpeg::silence_command(fc.story_gap_seconds)));
    out.push_str("### Concatenate final compilation:\n");
    out.push_str(&format!(
        "```bash\n{}\n```\n",
        ffmpeg::concat_command(PLAYLIST_FILE, OUTPUT_AUDIO_FILE)
    ));
    out
}

/// Writes metadata, playlist and assembly notes into `<base_dir>/final_compilation/`.
pub async fn save_final_compilation(fc: &FinalCompilation, base_dir: &Path) -> Result<PathBuf> {
    let final_dir = base_dir.join(FINAL_DIR);
    fs::create_dir_all(&final_dir)
        .await
        .with_context(|| format!("Failed to create dir {}", final_dir.display()))?;

    fs::write(final_dir.join(METADATA_FILE), serde_json::to_string_pretty(fc)?).await?;
    fs::write(final_dir.join(PLAYLIST_FILE), render_playlist(fc, &final_dir)).await?;
    fs::write(final_dir.join(INSTRUCTIONS_FILE), render_instructions(fc)).await?;

    Ok(final_dir)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionSummary {
    pub pipeline_name: String,
    pub production_start: String,
    pub production_end: String,
    pub total_production_time_minutes: f64,
    pub final_compilation: SummaryFigures,
    pub youtube_optimization: SummaryOptimization,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryFigures {
    pub duration_minutes: f64,
    pub target_duration_minutes: f64,
    pub duration_accuracy: String,
    pub story_count: usize,
    pub story_titles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOptimization {
    pub target_format: String,
    pub ad_placement_opportunities: String,
}

pub fn ad_slots(actual_seconds: f64) -> u64 {
    (actual_seconds.max(0.0) / AD_SLOT_SECONDS).floor() as u64
}

impl ProductionSummary {
    pub fn new(
        pipeline_name: &str,
        start: DateTime<Local>,
        end: DateTime<Local>,
        fc: &FinalCompilation,
    ) -> Self {
        let elapsed_minutes = (end - start).num_milliseconds() as f64 / 60_000.0;
        Self {
            pipeline_name: pipeline_name.to_string(),
            production_start: start.to_rfc3339(),
            production_end: end.to_rfc3339(),
            total_production_time_minutes: elapsed_minutes,
            final_compilation: SummaryFigures {
                duration_minutes: fc.actual_duration_seconds / 60.0,
                target_duration_minutes: fc.target_duration_seconds / 60.0,
                duration_accuracy: format!(
                    "{:.1}min difference",
                    fc.duration_difference_seconds.abs() / 60.0
                ),
                story_count: fc.selected_stories_count,
                story_titles: fc.stories.iter().map(|s| s.title.clone()).collect(),
            },
            youtube_optimization: SummaryOptimization {
                target_format: format!("{} long-form horror compilation", format_hms(fc.target_duration_seconds)),
                ad_placement_opportunities: format!(
                    "~{} mid-roll ads possible",
                    ad_slots(fc.actual_duration_seconds)
                ),
            },
            next_steps: [
                "Review final compilation audio quality",
                "Generate atmospheric background images",
                "Create YouTube thumbnail and metadata",
                "Upload and schedule for optimal posting time",
                "Monitor performance and iterate",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }

    pub async fn save(&self, final_dir: &Path) -> Result<PathBuf> {
        let path = final_dir.join(SUMMARY_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}
