//! Transform executors: repair, normalize, trim and amplify.
//!
//! Every transform follows the same sequence:
//!
//! 1. Preconditions (input exists, tool available, operation-specific
//!    checks). Unmet operation checks skip the file; they never fail it.
//! 2. Stop playback of the file and let the player settle.
//! 3. Run the tool into `<dir>/<stem>.<operation>.tmp<ext>`, next to the
//!    input so the final rename stays on one filesystem.
//! 4. Validate the temp file (present, non-empty).
//! 5. Safe-replace (see [`replace`]).
//!
//! Any failure removes the temp file. The original is either untouched or
//! recoverable from the archive.
//!
//! # Example
//!
//! ```ignore
//! let transformer = Transformer::new(runner, archive, playback, settings);
//! match transformer.transform(Operation::Trim, path, &cancel).await? {
//!     TransformOutcome::Succeeded { output, .. } => println!("wrote {:?}", output),
//!     TransformOutcome::Skipped { reason } => println!("skipped: {}", reason),
//! }
//! ```

pub mod amplify;
pub mod codec;
pub mod normalize;
pub mod repair;
pub mod replace;
pub mod trim;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::archive::PreservedArchive;
use crate::config::TransformSettings;
use crate::error::{Error, Result};
use crate::playback::{PlaybackControl, stop_if_playing};
use crate::probe::parser::{parse_diagnostics, parse_loudness_measurement};
use crate::tool::{ToolOutput, ToolRunner};

use trim::TrimPlan;

/// A file-modifying operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Repair,
    Normalize,
    Trim,
    Amplify,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Repair,
        Operation::Normalize,
        Operation::Trim,
        Operation::Amplify,
    ];

    /// Lowercase name, used in temp file names and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Repair => "repair",
            Operation::Normalize => "normalize",
            Operation::Trim => "trim",
            Operation::Amplify => "amplify",
        }
    }

    /// Past tense for progress messages.
    pub fn past_tense(&self) -> &'static str {
        match self {
            Operation::Repair => "Repaired",
            Operation::Normalize => "Normalized",
            Operation::Trim => "Trimmed",
            Operation::Amplify => "Amplified",
        }
    }

    /// Output suffix configured for this operation.
    pub fn suffix<'a>(&self, settings: &'a TransformSettings) -> &'a str {
        match self {
            Operation::Repair => &settings.suffixes.repair,
            Operation::Normalize => &settings.suffixes.normalize,
            Operation::Trim => &settings.suffixes.trim,
            Operation::Amplify => &settings.suffixes.amplify,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::config(format!("unknown operation '{}'", s)))
    }
}

/// Why a file was left alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipReason {
    /// Name already carries the operation suffix
    AlreadyProcessed,
    NoLeadingSilence,
    SilenceTooShort { seconds: f64 },
    /// The whole file is below the silence threshold
    EntirelySilent,
    GainNegligible { gain_db: f64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyProcessed => write!(f, "already processed"),
            SkipReason::NoLeadingSilence => write!(f, "no leading silence"),
            SkipReason::SilenceTooShort { seconds } => {
                write!(f, "leading silence too short ({:.2}s)", seconds)
            }
            SkipReason::EntirelySilent => write!(f, "file is entirely silent"),
            SkipReason::GainNegligible { gain_db } => {
                write!(f, "gain too small ({:+.2} dB)", gain_db)
            }
        }
    }
}

/// Result of a transform that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    Succeeded {
        output: PathBuf,
        /// Archive location of the original (preserve mode)
        archived: Option<PathBuf>,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl TransformOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransformOutcome::Succeeded { .. })
    }
}

/// Temp output path: `<dir>/<stem>.<operation>.tmp<.ext>`.
pub fn temp_path(input: &Path, op: Operation) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = extension_with_dot(input);
    input.with_file_name(format!("{}.{}.tmp{}", stem, op.name(), ext))
}

/// Final output path: `<dir>/<stem><suffix><.ext>`.
pub fn final_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = extension_with_dot(input);
    input.with_file_name(format!("{}{}{}", stem, suffix, ext))
}

fn extension_with_dot(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// What to run once preconditions pass.
enum Plan {
    Repair,
    Normalize {
        measured: crate::probe::parser::LoudnessMeasurement,
        sample_rate: Option<u32>,
    },
    Trim {
        start: f64,
    },
    Amplify {
        gain_db: f64,
    },
}

/// Runs transforms against one tool, archive and player.
#[derive(Clone)]
pub struct Transformer {
    runner: Arc<dyn ToolRunner>,
    archive: PreservedArchive,
    playback: Arc<dyn PlaybackControl>,
    settings: TransformSettings,
}

impl Transformer {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        archive: PreservedArchive,
        playback: Arc<dyn PlaybackControl>,
        settings: TransformSettings,
    ) -> Self {
        Self {
            runner,
            archive,
            playback,
            settings,
        }
    }

    pub fn settings(&self) -> &TransformSettings {
        &self.settings
    }

    pub fn archive(&self) -> &PreservedArchive {
        &self.archive
    }

    pub fn runner(&self) -> &dyn ToolRunner {
        self.runner.as_ref()
    }

    pub fn playback(&self) -> &dyn PlaybackControl {
        self.playback.as_ref()
    }

    /// Same collaborators, different settings.
    pub fn with_settings(&self, settings: TransformSettings) -> Self {
        Self {
            settings,
            ..self.clone()
        }
    }

    /// Transform one file, stopping its playback first.
    pub async fn transform(
        &self,
        op: Operation,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<TransformOutcome> {
        self.execute(op, input, cancel, true).await
    }

    /// Transform one file inside a batch; playback was already stopped.
    pub async fn transform_in_batch(
        &self,
        op: Operation,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<TransformOutcome> {
        self.execute(op, input, cancel, false).await
    }

    pub async fn repair(&self, input: &Path, cancel: &CancellationToken) -> Result<TransformOutcome> {
        self.transform(Operation::Repair, input, cancel).await
    }

    pub async fn normalize(&self, input: &Path, cancel: &CancellationToken) -> Result<TransformOutcome> {
        self.transform(Operation::Normalize, input, cancel).await
    }

    pub async fn trim(&self, input: &Path, cancel: &CancellationToken) -> Result<TransformOutcome> {
        self.transform(Operation::Trim, input, cancel).await
    }

    /// Amplify by `gain_db`, overriding the configured gain.
    pub async fn amplify(
        &self,
        input: &Path,
        gain_db: f64,
        cancel: &CancellationToken,
    ) -> Result<TransformOutcome> {
        let mut settings = self.settings.clone();
        settings.gain_db = gain_db;
        self.with_settings(settings)
            .transform(Operation::Amplify, input, cancel)
            .await
    }

    async fn execute(
        &self,
        op: Operation,
        input: &Path,
        cancel: &CancellationToken,
        stop_playback: bool,
    ) -> Result<TransformOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !input.is_file() {
            return Err(Error::not_found(input));
        }
        if !self.runner.is_available().await {
            tracing::error!(
                target: "transform",
                "Cannot {} {:?}: transcoder {:?} not available",
                op,
                input,
                self.runner.tool_path()
            );
            return Err(Error::tool_unavailable(self.runner.tool_path()));
        }

        let plan = match self.plan(op, input, cancel).await {
            Ok(Ok(plan)) => plan,
            Ok(Err(reason)) => {
                tracing::info!(target: "transform", "Skipping {} of {:?}: {}", op, input, reason);
                return Ok(TransformOutcome::Skipped { reason });
            }
            Err(e) => {
                log_failure(op, input, &e);
                return Err(e);
            }
        };

        if stop_playback && stop_if_playing(self.playback.as_ref(), Some(input)) {
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        let temp = temp_path(input, op);
        let result = self.produce(op, &plan, input, &temp, cancel).await;
        if let Err(e) = result {
            remove_temp(&temp);
            log_failure(op, input, &e);
            return Err(e);
        }

        let output = final_path(input, op.suffix(&self.settings));
        let archived = match self.finalize(input, &temp, &output, cancel).await {
            Ok(archived) => archived,
            Err(e) => {
                remove_temp(&temp);
                log_failure(op, input, &e);
                return Err(e);
            }
        };

        tracing::info!(target: "transform", "{} {:?} -> {:?}", op.past_tense(), input, output);
        Ok(TransformOutcome::Succeeded { output, archived })
    }

    /// Operation-specific preconditions. `Ok(Err(_))` means skip.
    async fn plan(
        &self,
        op: Operation,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<Plan, SkipReason>> {
        let settings = &self.settings;
        match op {
            Operation::Repair => Ok(Ok(Plan::Repair)),
            Operation::Amplify => {
                if amplify::is_negligible(settings.gain_db) {
                    Ok(Err(SkipReason::GainNegligible {
                        gain_db: settings.gain_db,
                    }))
                } else {
                    Ok(Ok(Plan::Amplify {
                        gain_db: settings.gain_db,
                    }))
                }
            }
            Operation::Trim => {
                if settings.skip_if_trimmed
                    && trim::is_already_trimmed(input, op.suffix(settings))
                {
                    return Ok(Err(SkipReason::AlreadyProcessed));
                }
                let analysis = self
                    .run_checked(&trim::detect_args(input, settings), cancel)
                    .await?;
                Ok(match trim::plan_trim(&analysis.stderr, settings) {
                    TrimPlan::Cut { start, silence_end } => {
                        tracing::debug!(
                            target: "transform",
                            "{:?}: leading silence ends at {:.3}s, cutting at {:.3}s",
                            input,
                            silence_end,
                            start
                        );
                        Ok(Plan::Trim { start })
                    }
                    TrimPlan::Skip(reason) => Err(reason),
                })
            }
            Operation::Normalize => {
                let analysis = self
                    .run_checked(&normalize::measure_args(input, &settings.loudness), cancel)
                    .await?;
                let measured = parse_loudness_measurement(&analysis.stderr).ok_or_else(|| {
                    Error::probe(input, "no loudness measurement in transcoder output")
                })?;
                if !measured.is_finite() {
                    return Err(Error::probe(
                        input,
                        "loudness cannot be measured (audio is silent)",
                    ));
                }
                let sample_rate = parse_diagnostics(&analysis.stderr).sample_rate_hz;
                Ok(Ok(Plan::Normalize {
                    measured,
                    sample_rate,
                }))
            }
        }
    }

    /// Run the tool into `temp` and validate what it wrote.
    async fn produce(
        &self,
        op: Operation,
        plan: &Plan,
        input: &Path,
        temp: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        remove_temp(temp);

        let args = match plan {
            Plan::Repair => repair::repair_args(input, temp),
            Plan::Normalize {
                measured,
                sample_rate,
            } => normalize::correct_args(input, temp, &self.settings.loudness, measured, *sample_rate),
            Plan::Trim { start } => trim::trim_args(input, temp, *start),
            Plan::Amplify { gain_db } => amplify::amplify_args(input, temp, *gain_db),
        };

        tracing::debug!(target: "transform", "{} {:?} into {:?}", op, input, temp);
        self.run_checked(&args, cancel).await?;
        validate_output(temp)
    }

    /// Archive/replace on a blocking thread. Cancellation is honored only
    /// before the first byte moves.
    async fn finalize(
        &self,
        input: &Path,
        temp: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let archive = self.archive.clone();
        let mode = self.settings.mode;
        let (input, temp, output) = (input.to_path_buf(), temp.to_path_buf(), output.to_path_buf());

        tokio::task::spawn_blocking(move || {
            replace::safe_replace(&input, &temp, &output, mode, &archive)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    /// Transform invocation: nonzero exit is a failure.
    async fn run_checked(
        &self,
        args: &[std::ffi::OsString],
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        self.runner
            .run(args, self.settings.transform_timeout, cancel)
            .await?
            .require_success()
    }
}

/// Temp file must exist and hold data.
fn validate_output(temp: &Path) -> Result<()> {
    match std::fs::metadata(temp) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(Error::invalid_output(temp, "transcoder produced an empty file")),
        Err(_) => Err(Error::invalid_output(temp, "transcoder produced no output file")),
    }
}

fn remove_temp(temp: &Path) {
    if temp.exists() {
        if let Err(e) = std::fs::remove_file(temp) {
            tracing::warn!(target: "transform", "Failed to remove temp file {:?}: {}", temp, e);
        }
    }
}

fn log_failure(op: Operation, input: &Path, error: &Error) {
    let file = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    match error {
        Error::Cancelled => {
            tracing::info!(target: "transform", "{} of {} cancelled", op, file);
        }
        Error::ToolFailed { exit_code, stderr } => {
            tracing::error!(
                target: "transform",
                "{} of {} failed with exit code {:?}: {}",
                op,
                file,
                exit_code,
                stderr
            );
        }
        other => {
            tracing::error!(target: "transform", "{} of {} failed: {}", op, file, other);
        }
    }
}
