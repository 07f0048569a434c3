use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use timeline_compositor::{
    CompositionEngine, CompositorError, Config, EncodedMedia, RenderMode, RenderRequest, Timeline,
};

#[derive(Parser)]
#[command(
    name = "timeline-compositor",
    version,
    about = "Render an edited clip timeline with animated captions into one video",
    long_about = "Timeline-Compositor cuts, re-times and filters clips from a screen recording and a narration track, draws animated captions on top, and encodes the result into a single WebM or MP4 file."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a timeline description (JSON) against the source assets
    Render {
        #[command(flatten)]
        common: CommonArgs,

        /// Timeline description with videoClips, audioClips and captions
        #[arg(short, long)]
        timeline: PathBuf,
    },

    /// Render the full video against the full narration, without cuts
    Sync {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Screen recording the video clips cut from
    #[arg(long)]
    video: PathBuf,

    /// Narration the audio clips cut from
    #[arg(short, long)]
    audio: PathBuf,

    /// Output file; the extension is replaced to match the negotiated container
    #[arg(short, long)]
    output: PathBuf,

    /// Render at the higher resolution cap and bitrate
    #[arg(short, long)]
    quality: bool,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl CommonArgs {
    fn mode(&self) -> RenderMode {
        if self.quality {
            RenderMode::Quality
        } else {
            RenderMode::Turbo
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let common = match &cli.command {
        Command::Render { common, .. } | Command::Sync { common } => common,
    };

    // Initialize logging
    let default_level = if common.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    info!("Starting Timeline-Compositor v{}", env!("CARGO_PKG_VERSION"));

    match run(&cli.command, common).await {
        Ok(path) => {
            info!("Composition complete! Output saved to: {:?}", path);
            Ok(())
        }
        Err(e) => {
            if let Some(compositor_error) = e.downcast_ref::<CompositorError>() {
                error!("Render failed at the {} stage", compositor_error.stage());
                eprintln!("{}", compositor_error.user_message());
            }
            Err(e)
        }
    }
}

async fn run(command: &Command, common: &CommonArgs) -> Result<PathBuf> {
    // Load configuration
    let config = match &common.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    let engine = CompositionEngine::new(config);
    let progress = |percent: f64| {
        let whole = percent.floor() as u32;
        if whole % 10 == 0 {
            info!("Progress: {:.0}%", percent);
        }
    };

    let media = match command {
        Command::Render { timeline, .. } => {
            info!("Timeline: {:?}", timeline);
            let timeline = Timeline::from_json_file(timeline)
                .with_context(|| format!("reading timeline {}", timeline.display()))?;
            let request = RenderRequest::new(common.video.clone(), common.audio.clone(), timeline)
                .with_mode(common.mode());
            engine.compose(request, throttled(progress)).await?
        }
        Command::Sync { .. } => {
            engine
                .compose_auto_sync(&common.video, &common.audio, common.mode(), throttled(progress))
                .await?
        }
    };

    save(&media, &common.output).await
}

/// Forward only whole-percent changes to the inner callback
fn throttled<F>(mut inner: F) -> impl FnMut(f64) + Send + 'static
where
    F: FnMut(f64) + Send + 'static,
{
    let mut last = None;
    move |percent| {
        let whole = percent.floor() as u32;
        if last != Some(whole) {
            last = Some(whole);
            inner(percent);
        }
    }
}

async fn save(media: &EncodedMedia, output: &Path) -> Result<PathBuf> {
    let path = output.with_extension(&media.extension);
    if path != output {
        info!("Container is {}; writing {:?}", media.mime_type, path);
    }
    media.save(&path).await?;
    info!(
        "Wrote {} frames ({:.2}s, {} bytes)",
        media.frame_count,
        media.duration,
        media.size()
    );
    Ok(path)
}
