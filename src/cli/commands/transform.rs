//! Batch transform commands: repair, normalize, trim and amplify.

use std::sync::Arc;
use tokio::runtime::Runtime;

use super::{
    TransformArgs, cancel_on_ctrl_c, collect_audio_files, effective_config,
    print_tool_install_instructions,
};
use crate::archive::PreservedArchive;
use crate::batch::{BatchOptions, BatchProgress, run_batch};
use crate::config::{Config, ReplaceMode};
use crate::playback::NoPlayback;
use crate::tool::{ToolRunner, Transcoder};
use crate::transform::{Operation, Transformer};

/// Run one operation over a file or directory
pub fn cmd_transform(
    rt: &Runtime,
    config: &Config,
    op: Operation,
    args: &TransformArgs,
    gain_db: Option<f64>,
) -> anyhow::Result<()> {
    let config = effective_config(config, args);
    let files = collect_audio_files(&args.path, args.recursive)?;
    if files.is_empty() {
        println!("No audio files found in {:?}", args.path);
        return Ok(());
    }

    let mut settings = config.transform_settings();
    if let Some(gain) = gain_db {
        settings.gain_db = gain;
    }

    let runner = Arc::new(Transcoder::new(&settings.tool_path));
    let transformer = Transformer::new(
        runner.clone(),
        PreservedArchive::new(&config.archive.root),
        Arc::new(NoPlayback),
        settings,
    );
    let options = BatchOptions::with_max_workers(config.batch.max_workers);

    let result = rt.block_on(async {
        if !runner.is_available().await {
            print_tool_install_instructions(runner.tool_path());
            std::process::exit(1);
        }

        println!(
            "Running {} on {} files with {} workers",
            op,
            files.len(),
            options.worker_count()
        );
        if config.transform.mode == ReplaceMode::Preserve {
            println!("Originals archived under {}", config.archive.root.display());
        }
        println!();

        let cancel = cancel_on_ctrl_c();
        let report = |progress: &BatchProgress| {
            if !progress.is_complete {
                println!(
                    "[{}/{}] {}",
                    progress.current_index, progress.total_files, progress.status
                );
            }
        };
        run_batch(&transformer, op, files, options, &report, &cancel).await
    });

    println!();
    println!("{}", result.summary());
    println!(
        "Elapsed: {:.1}s",
        (result.finished_at - result.started_at).num_milliseconds() as f64 / 1000.0
    );

    if !result.skipped_files.is_empty() {
        println!("\nSkipped:");
        for path in &result.skipped_files {
            println!("  {}", path.display());
        }
    }
    if !result.failed_files.is_empty() {
        println!("\nFailed:");
        for path in &result.failed_files {
            println!("  {}", path.display());
        }
        anyhow::bail!("{} of {} files failed", result.failure_count, result.total_files);
    }
    Ok(())
}
