//! Batch orchestration: one operation over many files.
//!
//! Playback is stopped once up front. Files are then dispatched to a bounded
//! pool of workers (`buffer_unordered`), each owning at most one transcoder
//! process at a time. Outcomes are folded into shared counters and reported
//! to an observer after every completion.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::playback::stop_if_playing;
use crate::transform::{Operation, TransformOutcome, Transformer};

/// Default cap on concurrent transcoder processes.
pub const DEFAULT_MAX_WORKERS: usize = 3;

/// Snapshot pushed to the observer after each file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchProgress {
    pub current_file: Option<PathBuf>,
    /// Files completed so far
    pub current_index: usize,
    pub total_files: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    pub status: String,
    pub is_complete: bool,
}

/// Aggregate outcome of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub operation: Operation,
    pub total_files: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    pub failed_files: Vec<PathBuf>,
    pub skipped_files: Vec<PathBuf>,
    pub is_complete: bool,
    pub was_cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    /// Files that reached an outcome.
    pub fn processed(&self) -> usize {
        self.success_count + self.failure_count + self.skipped_count
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} succeeded, {} skipped, {} failed of {}{}",
            self.operation,
            self.success_count,
            self.skipped_count,
            self.failure_count,
            self.total_files,
            if self.was_cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub max_workers: usize,
    pub hardware_concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            hardware_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl BatchOptions {
    pub fn with_max_workers(max_workers: usize) -> Self {
        Self {
            max_workers,
            ..Self::default()
        }
    }

    pub fn worker_count(&self) -> usize {
        worker_count(self.hardware_concurrency, self.max_workers)
    }
}

/// `min(hardware, cap)`, never zero.
pub fn worker_count(hardware_concurrency: usize, cap: usize) -> usize {
    hardware_concurrency.min(cap).max(1)
}

#[derive(Default)]
struct Tally {
    completed: AtomicUsize,
    success: AtomicUsize,
    failure: AtomicUsize,
    skipped: AtomicUsize,
    failed_files: Mutex<Vec<PathBuf>>,
    skipped_files: Mutex<Vec<PathBuf>>,
}

/// Per-file result inside a batch.
enum FileOutcome {
    Succeeded,
    Skipped(String),
    Failed(String),
    Cancelled,
}

/// Run `op` over `files` with bounded parallelism.
///
/// Per-file errors are recorded, never propagated. Cancellation stops new
/// dispatch; in-flight transforms are interrupted inside the runner.
///
/// Repeated paths are dropped before counting, so `total_files` is the
/// number of unique paths and may be less than `files.len()`.
pub async fn run_batch(
    transformer: &Transformer,
    op: Operation,
    files: Vec<PathBuf>,
    options: BatchOptions,
    observer: &(dyn Fn(&BatchProgress) + Send + Sync),
    cancel: &CancellationToken,
) -> BatchResult {
    let started_at = Utc::now();
    let files = dedupe(files);
    let total = files.len();
    let workers = options.worker_count();

    tracing::info!(
        target: "batch",
        "Starting {} of {} files with {} workers",
        op,
        total,
        workers
    );

    if stop_if_playing(transformer.playback(), None) {
        tokio::time::sleep(transformer.settings().settle_delay).await;
    }

    let tally = Tally::default();

    stream::iter(files)
        .map(|path| {
            let tally = &tally;
            async move {
                // Nothing new starts once cancelled
                if cancel.is_cancelled() {
                    return;
                }
                let outcome = match transformer.transform_in_batch(op, &path, cancel).await {
                    Ok(TransformOutcome::Succeeded { .. }) => FileOutcome::Succeeded,
                    Ok(TransformOutcome::Skipped { reason }) => FileOutcome::Skipped(reason.to_string()),
                    Err(Error::Cancelled) => FileOutcome::Cancelled,
                    Err(e) => FileOutcome::Failed(e.summary()),
                };
                if let Some(progress) = record(tally, op, &path, outcome, total) {
                    observer(&progress);
                }
            }
        })
        .buffer_unordered(workers)
        .for_each(|()| async {})
        .await;

    let was_cancelled = cancel.is_cancelled();
    let result = BatchResult {
        operation: op,
        total_files: total,
        success_count: tally.success.load(Ordering::SeqCst),
        failure_count: tally.failure.load(Ordering::SeqCst),
        skipped_count: tally.skipped.load(Ordering::SeqCst),
        failed_files: tally.failed_files.into_inner(),
        skipped_files: tally.skipped_files.into_inner(),
        is_complete: true,
        was_cancelled,
        started_at,
        finished_at: Utc::now(),
    };

    observer(&BatchProgress {
        current_file: None,
        current_index: result.processed(),
        total_files: total,
        success_count: result.success_count,
        failure_count: result.failure_count,
        skipped_count: result.skipped_count,
        status: if was_cancelled {
            format!("Cancelled. {}", result.summary())
        } else {
            result.summary()
        },
        is_complete: true,
    });

    tracing::info!(target: "batch", "{}", result.summary());
    result
}

/// Fold one outcome into the tally. Cancelled files are not counted.
fn record(
    tally: &Tally,
    op: Operation,
    path: &std::path::Path,
    outcome: FileOutcome,
    total: usize,
) -> Option<BatchProgress> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let status = match outcome {
        FileOutcome::Cancelled => return None,
        FileOutcome::Succeeded => {
            tally.success.fetch_add(1, Ordering::SeqCst);
            format!("{} {}", op.past_tense(), name)
        }
        FileOutcome::Skipped(reason) => {
            tally.skipped.fetch_add(1, Ordering::SeqCst);
            tally.skipped_files.lock().push(path.to_path_buf());
            format!("Skipped {}: {}", name, reason)
        }
        FileOutcome::Failed(message) => {
            tally.failure.fetch_add(1, Ordering::SeqCst);
            tally.failed_files.lock().push(path.to_path_buf());
            format!("Failed {}: {}", name, message)
        }
    };
    let completed = tally.completed.fetch_add(1, Ordering::SeqCst) + 1;

    Some(BatchProgress {
        current_file: Some(path.to_path_buf()),
        current_index: completed,
        total_files: total,
        success_count: tally.success.load(Ordering::SeqCst),
        failure_count: tally.failure.load(Ordering::SeqCst),
        skipped_count: tally.skipped.load(Ordering::SeqCst),
        status,
        is_complete: false,
    })
}

/// Drop repeated paths, keeping first occurrences in order.
fn dedupe(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let before = files.len();
    let unique: Vec<PathBuf> = files
        .into_iter()
        .filter(|path| seen.insert(path.clone()))
        .collect();
    if unique.len() < before {
        tracing::warn!(
            target: "batch",
            "Ignoring {} duplicate file(s) in batch",
            before - unique.len()
        );
    }
    unique
}
