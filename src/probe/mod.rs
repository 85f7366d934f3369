//! Read-only inspection of audio files.
//!
//! A probe runs the transcoder with only an input, captures its stderr
//! report, parses it into a [`ProbeResult`] and classifies it with
//! [`detect_issues`].
//!
//! # Example
//!
//! ```ignore
//! use music_mender::probe::probe_file;
//!
//! let result = probe_file(&transcoder, path, Duration::from_secs(30), &cancel).await?;
//! if result.issues.has_any_issue() {
//!     println!("{}: {:?}", path.display(), result.issues.descriptions());
//! }
//! ```

mod issues;
pub mod parser;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::tool::ToolRunner;

pub use issues::{
    IssueSet, STANDARD_SAMPLE_RATES, VERY_HIGH_BITRATE_KBPS, VERY_LOW_BITRATE_KBPS,
    detect_issues,
};
pub use parser::{DiagnosticFields, parse_diagnostics};

/// Placeholder for a field the tool did not report.
pub const UNKNOWN: &str = "unknown";

/// Properties of one probed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub file_path: PathBuf,
    /// False if the tool produced no usable report
    pub success: bool,
    pub format: String,
    pub codec: String,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate_hz: Option<u32>,
    pub channels: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub error_message: Option<String>,
    #[serde(serialize_with = "serialize_issues")]
    pub issues: IssueSet,
}

impl ProbeResult {
    /// A result with every field unknown.
    pub fn unknown(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: path.into(),
            success: false,
            format: UNKNOWN.to_string(),
            codec: UNKNOWN.to_string(),
            bitrate_kbps: None,
            sample_rate_hz: None,
            channels: None,
            duration_seconds: None,
            error_message: None,
            issues: IssueSet::empty(),
        }
    }

    /// Build a classified result from raw diagnostic text.
    pub fn from_diagnostics(path: impl Into<PathBuf>, text: &str) -> Self {
        let fields = parse_diagnostics(text);
        let mut result = Self {
            success: !fields.is_empty(),
            error_message: fields
                .is_empty()
                .then(|| "Transcoder reported no readable stream information".to_string()),
            format: fields.format.unwrap_or_else(|| UNKNOWN.to_string()),
            codec: fields.codec.unwrap_or_else(|| UNKNOWN.to_string()),
            bitrate_kbps: fields.bitrate_kbps,
            sample_rate_hz: fields.sample_rate_hz,
            channels: fields.channels,
            duration_seconds: fields.duration_seconds,
            ..Self::unknown(path)
        };
        result.issues = detect_issues(&result);
        result
    }

    pub fn has_known_format(&self) -> bool {
        self.format != UNKNOWN
    }

    pub fn has_known_codec(&self) -> bool {
        self.codec != UNKNOWN
    }
}

fn serialize_issues<S: Serializer>(issues: &IssueSet, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(issues.iter_names().map(|(name, _)| name))
}

/// Arguments for a read-only probe.
pub fn probe_args(path: &Path) -> Vec<std::ffi::OsString> {
    crate::tool_args!["-hide_banner", "-i", path]
}

/// Probe a file.
///
/// The exit code is ignored: the tool exits nonzero when given no output,
/// but its stderr report is still complete. Empty diagnostics yield a
/// result flagged [`IssueSet::CORRUPT_HEADERS`] rather than an error.
///
/// # Errors
///
/// [`Error::NotFound`] for a missing input, [`Error::ToolUnavailable`],
/// [`Error::Timeout`] and [`Error::Cancelled`] from the runner.
pub async fn probe_file(
    runner: &dyn ToolRunner,
    path: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ProbeResult> {
    if !path.exists() {
        return Err(Error::not_found(path));
    }
    if !runner.is_available().await {
        return Err(Error::tool_unavailable(runner.tool_path()));
    }

    let output = runner.run(&probe_args(path), timeout, cancel).await?;
    let result = ProbeResult::from_diagnostics(path, &output.stderr);

    if result.success {
        tracing::debug!(
            target: "probe",
            "{}: {} {} {:?}kb/s {:?}Hz issues={:?}",
            path.display(),
            result.format,
            result.codec,
            result.bitrate_kbps,
            result.sample_rate_hz,
            result.issues
        );
    } else {
        tracing::warn!(
            target: "probe",
            "{}: no readable diagnostics (exit code {:?}): {}",
            path.display(),
            output.exit_code,
            output.stderr.trim()
        );
    }

    Ok(result)
}
