use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use horror_compilation::api::SpeechSynthesizer;
use horror_compilation::api::claude::ClaudeCli;
use horror_compilation::api::kokoro::KokoroClient;
use horror_compilation::config::Config;
use horror_compilation::ffmpeg::Ffprobe;
use horror_compilation::init::{self, Requirements};
use horror_compilation::pipeline::{PipelineOutcome, ProductionPipeline};
use horror_compilation::set_log_hook;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

const RUN_LOG_FILE: &str = "pipeline.log";

#[derive(Parser, Debug)]
#[command(name = "horror-compilation", about = "Generate and length-fit horror story compilations")]
struct Args {
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate stories, narrate them and pick the best-fitting set.
    Pipeline {
        #[arg(long)]
        target: Option<usize>,
        #[arg(long)]
        buffer: Option<usize>,
        /// Three stories plus two buffer, for trying the setup out.
        #[arg(long, conflicts_with_all = ["target", "buffer"])]
        quick: bool,
    },
    /// Only generate and save a story compilation.
    Generate {
        #[arg(long)]
        target: Option<usize>,
        #[arg(long)]
        buffer: Option<usize>,
    },
    /// Narrate and length-fit an existing compilation.
    Select {
        /// Path to creative_compilation_metadata.json; defaults to the newest.
        #[arg(long)]
        metadata: Option<PathBuf>,
        #[arg(long)]
        target: Option<usize>,
    },
}

fn install_run_log() -> Arc<Mutex<Vec<String>>> {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    set_log_hook(Some(Arc::new(Mutex::new(move |line: &str| {
        sink.lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.to_string());
    }))));
    lines
}

async fn write_run_log(lines: &Arc<Mutex<Vec<String>>>, dir: &Path) -> Result<()> {
    let mut text = lines.lock().unwrap_or_else(|e| e.into_inner()).join("\n");
    text.push('\n');
    let path = dir.join(RUN_LOG_FILE);
    tokio::fs::write(&path, text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

async fn run(args: Args) -> Result<Option<PipelineOutcome>> {
    let cfg = Config::load(&args.config).await?;
    init::ensure_directories(&cfg).await?;

    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let claude = ClaudeCli::new(cfg.claude_bin.clone(), cfg.claude_model.clone());
    let kokoro = KokoroClient::new(http, cfg.kokoro_url.clone());
    let probe = Ffprobe;

    let needs = match &args.command {
        Command::Pipeline { .. } => Requirements { story_cli: true, speech: true },
        Command::Generate { .. } => Requirements { story_cli: true, speech: false },
        Command::Select { .. } => Requirements { story_cli: false, speech: true },
    };
    init::check_prerequisites(&claude, &kokoro as &dyn SpeechSynthesizer, &cfg, needs).await?;

    let pipeline = ProductionPipeline::new(&claude, &kokoro, &probe, cfg.clone());
    match args.command {
        Command::Pipeline { target, buffer, quick } => {
            let (target, buffer) = if quick {
                (3, 2)
            } else {
                (
                    target.unwrap_or(cfg.target_stories),
                    buffer.unwrap_or(cfg.buffer_stories),
                )
            };
            Ok(Some(pipeline.run_full(target, buffer).await?))
        }
        Command::Generate { target, buffer } => {
            let (dir, compilation) = pipeline
                .generate(
                    target.unwrap_or(cfg.target_stories),
                    buffer.unwrap_or(cfg.buffer_stories),
                )
                .await?;
            tracing::info!(
                "Compilation '{}' saved to {} ({} stories, {} words)",
                compilation.theme_data.compilation_title,
                dir.display(),
                compilation.total_generated,
                compilation.total_words
            );
            Ok(None)
        }
        Command::Select { metadata, target } => {
            Ok(Some(pipeline.optimize_existing(metadata.as_deref(), target).await?))
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let run_log = install_run_log();

    let code = match run(args).await {
        Ok(outcome) => {
            if let Some(outcome) = outcome {
                if let Err(err) = write_run_log(&run_log, &outcome.final_dir).await {
                    tracing::warn!("{:#}", err);
                }
                tracing::info!("Output: {}", outcome.final_dir.display());
            }
            0
        }
        Err(err) => {
            tracing::error!("{:#}", err);
            1
        }
    };

    set_log_hook(None);
    std::process::exit(code);
}
