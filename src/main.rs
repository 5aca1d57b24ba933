use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use subtitler::command::check_tool;
use subtitler::{print_summary, Config, Job, Pipeline, PipelineSettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "subtitler")]
#[command(version, about = "Translate and burn subtitles into a video")]
#[command(
    long_about = "Transcribe a video's speech with OpenAI Whisper, translate it with Google Gemini, and write a copy of the video with the translated subtitles burned in."
)]
struct Cli {
    /// Input video file
    input: PathBuf,

    /// Target language code (e.g., es, fr, ja)
    #[arg(short, long)]
    to: Option<String>,

    /// Spoken language of the input (e.g., en)
    #[arg(short, long)]
    from: Option<String>,

    /// Directory for the subtitled video (defaults to the input's directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Disable progress spinners
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn default_output_dir(input: &Path) -> PathBuf {
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Validate input file exists
    if !cli.input.is_file() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    // Load and validate configuration
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(from) = cli.from {
        config.source_language = from;
    }
    let target = cli.to.unwrap_or_else(|| config.target_language.clone());
    config
        .validate(&config.source_language, &target)
        .context("Configuration validation failed")?;

    for tool in [&config.ffmpeg_path, &config.ffprobe_path] {
        if !check_tool(tool).await.unwrap_or(false) {
            anyhow::bail!(
                "{} not found. Install it with: brew install ffmpeg (macOS) or apt install ffmpeg (Linux)",
                tool
            );
        }
    }

    let output_dir = cli
        .output_dir
        .unwrap_or_else(|| default_output_dir(&cli.input));

    let job = Job::new(
        &cli.input,
        config.source_language.clone(),
        target.clone(),
        output_dir,
    );

    info!("Job:      {}", job.id());
    info!("Input:    {}", cli.input.display());
    info!("Output:   {}", job.output_dir().display());
    info!("Language: {} -> {}", job.source_language(), target);

    // Ctrl+C cancels the job; cleanup still runs before we exit.
    let token = job.cancellation_token();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, cancelling job");
        token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let settings = PipelineSettings {
        show_progress: !cli.no_progress,
        ..PipelineSettings::from_config(&config)
    };
    let pipeline = Pipeline::new(subtitler::Collaborators::from_config(&config), settings);

    let result = pipeline.run(&job).await?;
    print_summary(&result);

    Ok(())
}
