//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `tools`: transcoder checks and configuration
//! - `probe`: read-only probing and issue reports
//! - `transform`: repair, normalize, trim and amplify batches

mod probe;
mod tools;
mod transform;

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::config::{self, Config};
use crate::transform::Operation;

pub use probe::{cmd_analyze, cmd_probe};
pub use tools::{cmd_check_tools, cmd_config};
pub use transform::cmd_transform;

/// Music Mender CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Transcoder executable (overrides the config file)
    #[arg(long, global = true, env = "MUSIC_MENDER_TOOL")]
    pub tool: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every transform command
#[derive(Args, Debug, Clone)]
pub struct TransformArgs {
    /// File or directory to process
    pub path: PathBuf,
    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,
    /// Delete originals instead of archiving them
    #[arg(long)]
    pub replace: bool,
    /// Maximum concurrent transcoder processes
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Check that the transcoder is installed
    CheckTools,
    /// Probe a single file and report its stream details
    Probe {
        /// Path to the audio file
        path: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Probe every audio file in a directory and report issues
    Analyze {
        /// Directory to analyze
        path: PathBuf,
        /// Recurse into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Show only files with issues
        #[arg(long)]
        issues_only: bool,
    },
    /// Re-encode files to repair damaged headers or streams
    Repair(TransformArgs),
    /// Two-pass loudness normalization
    Normalize(TransformArgs),
    /// Remove leading silence
    Trim(TransformArgs),
    /// Apply a fixed gain
    Amplify {
        #[command(flatten)]
        args: TransformArgs,
        /// Gain in dB (negative attenuates)
        #[arg(short, long, allow_hyphen_values = true)]
        gain: Option<f64>,
    },
    /// Show the effective configuration
    Config {
        /// Write the defaults to the config file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let mut config = config::load();
    if let Some(tool) = &cli.tool {
        config.tool.path = tool.clone();
    }

    match &cli.command {
        Commands::CheckTools => cmd_check_tools(&rt, &config),
        Commands::Probe { path, json } => cmd_probe(&rt, &config, path, *json),
        Commands::Analyze {
            path,
            recursive,
            issues_only,
        } => cmd_analyze(&rt, &config, path, *recursive, *issues_only),
        Commands::Repair(args) => cmd_transform(&rt, &config, Operation::Repair, args, None),
        Commands::Normalize(args) => cmd_transform(&rt, &config, Operation::Normalize, args, None),
        Commands::Trim(args) => cmd_transform(&rt, &config, Operation::Trim, args, None),
        Commands::Amplify { args, gain } => {
            cmd_transform(&rt, &config, Operation::Amplify, args, *gain)
        }
        Commands::Config { init } => cmd_config(&config, *init),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Print installation instructions for the transcoder
pub(crate) fn print_tool_install_instructions(tool: &Path) {
    eprintln!("Error: transcoder not found at {:?}.", tool);
    eprintln!("Install FFmpeg:");
    eprintln!("  Windows: winget install Gyan.FFmpeg");
    eprintln!("  macOS:   brew install ffmpeg");
    eprintln!("  Linux:   apt install ffmpeg");
}

/// Cancellation token that fires on Ctrl-C.
///
/// Must be called inside the runtime.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            trigger.cancel();
        }
    });
    cancel
}

/// Collect audio files from a path (file or directory)
pub(crate) fn collect_audio_files(path: &Path, recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = if recursive {
        walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| is_audio_file(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect()
    } else {
        std::fs::read_dir(path)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|e| is_audio_file(&e.path()))
            .map(|e| e.path())
            .collect()
    };
    files.sort();
    Ok(files)
}

/// Check if a path has an audio file extension. Temp outputs are excluded.
pub(crate) fn is_audio_file(path: &Path) -> bool {
    let is_temp = path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| stem.ends_with(".tmp"));
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    !is_temp
        && matches!(
            ext.as_deref(),
            Some("mp3" | "flac" | "ogg" | "oga" | "opus" | "m4a" | "aac" | "wav")
        )
}

/// Config with per-invocation overrides applied.
pub(crate) fn effective_config(config: &Config, args: &TransformArgs) -> Config {
    let mut config = config.clone();
    if args.replace {
        config.transform.mode = config::ReplaceMode::Replace;
    }
    if let Some(workers) = args.workers {
        config.batch.max_workers = workers;
    }
    config
}
