// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow, Context};
use log::{error, warn, info, LevelFilter, Log, Metadata, Record, Level, SetLoggerError};
use std::path::{Path, PathBuf};
use std::io::Write;
use std::fs::File;
use std::io::BufReader;
use std::time::Duration;
use clap::{Parser, ValueEnum, CommandFactory, Subcommand, Args};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use resub::app_config::{self, Config};
use resub::file_utils::FileManager;
use resub::subtitle_processor::SubtitleTrack;
use resub::sync::framerate::detect_subtitle_framerate;
use resub::sync::{compare_versions, detect_version_info, ProgressLog, SyncEngine, SyncOptions, SyncOutcome};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Align a subtitle to the dialogue of a video
    Sync(SyncArgs),

    /// Shift every subtitle timestamp by a fixed number of seconds
    Shift {
        /// Subtitle file (SRT)
        #[arg(value_name = "SUBTITLE")]
        subtitle: PathBuf,

        /// Offset in seconds; negative values make subtitles appear earlier
        #[arg(value_name = "SECONDS", allow_hyphen_values = true)]
        seconds: f64,

        /// Output file (default: <subtitle>.shifted.srt)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Force overwrite of existing output files
        #[arg(short, long)]
        force_overwrite: bool,
    },

    /// Guess the framerate a subtitle was authored for
    Framerate {
        /// Subtitle file (SRT)
        #[arg(value_name = "SUBTITLE")]
        subtitle: PathBuf,
    },

    /// Compare release information of a video and a subtitle filename
    Advise {
        /// Video file name
        #[arg(value_name = "VIDEO")]
        video: PathBuf,

        /// Subtitle file name
        #[arg(value_name = "SUBTITLE")]
        subtitle: PathBuf,
    },

    /// Generate shell completions for resub
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Video file
    #[arg(value_name = "VIDEO")]
    video: PathBuf,

    /// Subtitle file (SRT)
    #[arg(value_name = "SUBTITLE")]
    subtitle: PathBuf,

    /// Output file (default: <subtitle>.sync.srt next to the subtitle)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Sample points per analysis pass
    #[arg(short = 'n', long)]
    num_samples: Option<usize>,

    /// Maximum analysis passes
    #[arg(short = 'i', long)]
    max_iterations: Option<usize>,

    /// Offset in seconds considered already in sync
    #[arg(long)]
    negligible: Option<f64>,

    /// Spoken language code (e.g., 'en', 'fr'); detected when omitted
    #[arg(long)]
    language: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Also append progress lines to this file
    #[arg(long)]
    progress_log: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,
}

/// resub - speech-driven subtitle re-synchronization
///
/// Listens to a few windows of the video's dialogue and shifts the subtitle
/// until it lines up.
#[derive(Parser, Debug)]
#[command(name = "resub")]
#[command(version)]
#[command(about = "Re-synchronize subtitles to the dialogue of a video")]
#[command(long_about = "resub samples the audio of a video, transcribes short windows and shifts the subtitle until its timing matches the speech.

EXAMPLES:
    resub sync movie.mkv movie.en.srt            # Writes movie.en.sync.srt
    resub sync -n 8 -i 3 movie.mkv movie.srt     # More samples, fewer passes
    resub sync --language fr movie.mkv movie.srt # Skip language detection
    resub shift movie.srt -2.5                   # Subtitles 2.5s earlier
    resub framerate movie.srt                    # Guess subtitle framerate
    resub advise movie.mkv movie.srt             # Release mismatch check
    resub completions bash > resub.bash          # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

REQUIREMENTS:
    ffmpeg and ffprobe on PATH, and a whisper.cpp CLI with a model file
    (see tools.whisper_path and tools.whisper_model in conf.json).")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji and ANSI color for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("❌ ", "1;31"),
            Level::Warn => ("🚧 ", "1;33"),
            Level::Info => (" ", "1;32"),
            Level::Debug => ("🔍 ", "1;36"),
            Level::Trace => ("📋 ", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (emoji, color) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {} {}\x1B[0m",
                color, now, emoji, record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logger starts at trace; the effective level is set with set_max_level
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Sync(args) => run_sync(args).await,
        Commands::Shift { subtitle, seconds, output, force_overwrite } => {
            run_shift(&subtitle, seconds, output, force_overwrite)
        }
        Commands::Framerate { subtitle } => run_framerate(&subtitle),
        Commands::Advise { video, subtitle } => {
            run_advise(&video, &subtitle);
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "resub", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Load conf.json, creating it with defaults when missing
fn load_config(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        let file = File::open(config_path)
            .context(format!("Failed to open config file: {}", config_path))?;

        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .context(format!("Failed to parse config file: {}", config_path))?;
        Ok(config)
    } else {
        warn!("Config file not found at '{}', creating default config.", config_path);

        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;

        std::fs::write(config_path, config_json)
            .context(format!("Failed to write default config to file: {}", config_path))?;

        Ok(config)
    }
}

async fn run_sync(args: SyncArgs) -> Result<()> {
    if let Some(cmd_log_level) = &args.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = load_config(&args.config_path)?;

    // Override config with CLI options if provided
    if let Some(num_samples) = args.num_samples {
        config.sync.num_samples = num_samples;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.sync.max_iterations = max_iterations;
    }
    if let Some(negligible) = args.negligible {
        config.sync.negligible_threshold = negligible;
    }
    if let Some(language) = &args.language {
        config.sync.language = Some(language.clone());
    }
    if let Some(log_level) = &args.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate()
        .context("Configuration validation failed")?;

    if args.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    let output = args.output.clone()
        .unwrap_or_else(|| FileManager::generate_output_path(&args.subtitle, "sync"));
    if output.exists() && !args.force_overwrite {
        return Err(anyhow!("Output file already exists: {:?}. Use -f to force overwrite.", output));
    }

    let engine = SyncEngine::from_config(&config);
    let options = SyncOptions::from(&config.sync);
    let progress = match &args.progress_log {
        Some(path) => ProgressLog::with_mirror(path),
        None => ProgressLog::new(),
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling synchronization");
            interrupt.cancel();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    let watcher = {
        let progress = progress.clone();
        let spinner = spinner.clone();
        tokio::spawn(async move {
            let mut cursor = 0;
            while !progress.is_complete() {
                let (lines, next) = progress.lines_since(cursor);
                cursor = next;
                if let Some(last) = lines.last() {
                    spinner.set_message(last.clone());
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        })
    };

    let result = engine
        .synchronize_with(&args.video, &args.subtitle, &options, &progress, &cancel)
        .await
        .and_then(|outcome| outcome.write_corrected(&output).map(|()| outcome));
    let _ = watcher.await;
    spinner.finish_and_clear();

    match result {
        Ok(outcome) => {
            print_outcome(&outcome, &output);
            Ok(())
        }
        Err(diagnostic) => {
            error!("Synchronization failed: {}", diagnostic.error);
            for hint in &diagnostic.hints {
                warn!("Hint: {}", hint);
            }
            for advisory in &diagnostic.advisories {
                warn!("Advisory: {}", advisory);
            }
            Err(anyhow!(diagnostic))
        }
    }
}

fn print_outcome(outcome: &SyncOutcome, output: &Path) {
    let report = &outcome.report;
    println!("Status       {}", outcome.status);
    println!("Passes       {}", outcome.iterations);
    println!("Correction   {:+.3}s", outcome.total_correction_secs);
    println!("Quality      {} (confidence {:.0}%)", report.quality, report.confidence * 100.0);
    println!("Last offset  {:+.3}s (stdev {:.3}s)", report.mean, report.stdev);
    println!("Points       {}/{}", report.valid_points, report.total_points);
    match (outcome.subtitle_fps, outcome.framerate_adjustment) {
        (_, Some(adjustment)) => println!(
            "Framerate    {:.3} -> {:.3} fps (x{:.5})",
            adjustment.from_fps, adjustment.to_fps, adjustment.ratio
        ),
        (Some(fps), None) => println!("Framerate    video {:.3} fps, subtitle {:.3} fps", outcome.video_fps, fps),
        (None, None) => println!("Framerate    video {:.3} fps, subtitle unknown", outcome.video_fps),
    }
    println!("Language     {}", outcome.language.as_deref().unwrap_or("unknown"));
    println!("Output       {}", output.display());

    for (pass, pass_report) in outcome.history.iter().enumerate() {
        println!(
            "  pass {}: {:+.3}s +/- {:.3}s {} ({}/{} points)",
            pass + 1, pass_report.mean, pass_report.stdev, pass_report.quality,
            pass_report.valid_points, pass_report.total_points
        );
    }
    for warning in &outcome.warnings {
        warn!("{}", warning);
    }
    for advisory in &outcome.advisories {
        warn!("Advisory: {}", advisory);
    }
}

fn run_shift(subtitle: &Path, seconds: f64, output: Option<PathBuf>, force_overwrite: bool) -> Result<()> {
    if !seconds.is_finite() {
        return Err(anyhow!("Offset must be a finite number of seconds"));
    }

    let mut track = SubtitleTrack::from_file(subtitle)
        .with_context(|| format!("Failed to load subtitle: {:?}", subtitle))?;
    let output = output.unwrap_or_else(|| FileManager::generate_output_path(subtitle, "shifted"));
    if output.exists() && !force_overwrite {
        return Err(anyhow!("Output file already exists: {:?}. Use -f to force overwrite.", output));
    }

    track.shift(seconds);
    track.write_to_srt(&output)?;
    info!("Shifted {} entries by {:+.3}s: {:?}", track.len(), seconds, output);
    Ok(())
}

fn run_framerate(subtitle: &Path) -> Result<()> {
    let track = SubtitleTrack::from_file(subtitle)
        .with_context(|| format!("Failed to load subtitle: {:?}", subtitle))?;
    match detect_subtitle_framerate(&track) {
        Some(fps) => println!("{:.3}", fps),
        None => println!("unknown"),
    }
    Ok(())
}

fn run_advise(video: &Path, subtitle: &Path) {
    let video_info = detect_version_info(&video.to_string_lossy());
    let subtitle_info = detect_version_info(&subtitle.to_string_lossy());
    println!("Video     {}", video_info);
    println!("Subtitle  {}", subtitle_info);

    let advisories = compare_versions(&video_info, &subtitle_info);
    if advisories.is_empty() {
        println!("No release mismatch detected");
    }
    for advisory in advisories {
        println!("- {}", advisory);
    }
}
