//! Crate-wide error types.
//!
//! Library modules return [`Error`] through the [`Result`] alias, while the
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Taxonomy
//!
//! - [`Error::ToolUnavailable`]: the transcoder cannot be invoked (fail fast)
//! - [`Error::ProbeFailure`]: diagnostics could not be produced for a file
//! - [`Error::ToolFailed`] / [`Error::InvalidOutput`] / [`Error::Replace`]:
//!   transform failures
//! - [`Error::Timeout`]: the tool ran past its deadline and was killed
//! - [`Error::Cancelled`]: cooperative cancellation, never counted as failure
//!
//! Skipping a file is not an error; see
//! [`TransformOutcome`](crate::transform::TransformOutcome).

use std::path::PathBuf;
use std::time::Duration;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The external transcoder is missing or not invocable
    #[error("Transcoder not available: {0}")]
    ToolUnavailable(PathBuf),

    /// The tool could not report on a file
    #[error("Probe failed for {path}: {message}")]
    ProbeFailure { path: PathBuf, message: String },

    /// The tool exited with a nonzero status during a transform
    #[error("Transcoder exited with code {exit_code:?}: {stderr}")]
    ToolFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The tool ran but its output is missing or empty
    #[error("Invalid output {path}: {message}")]
    InvalidOutput { path: PathBuf, message: String },

    /// The tool exceeded its deadline and was killed
    #[error("Transcoder timed out after {0:?}")]
    Timeout(Duration),

    /// The operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Moving files into place failed
    #[error("Safe-replace failed for {path}: {message}")]
    Replace { path: PathBuf, message: String },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a tool-unavailable error.
    pub fn tool_unavailable(path: impl Into<PathBuf>) -> Self {
        Self::ToolUnavailable(path.into())
    }

    /// Create a probe failure.
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ProbeFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a tool failure from an exit code and captured stderr.
    pub fn tool_failed(exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::ToolFailed {
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Create an invalid-output error.
    pub fn invalid_output(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidOutput {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a safe-replace error.
    pub fn replace(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Replace {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// One-line description for progress displays.
    ///
    /// Tool failures keep only the exit code and the last stderr line; the
    /// full stderr belongs in the log.
    pub fn summary(&self) -> String {
        match self {
            Self::ToolFailed { exit_code, stderr } => {
                let last_line = stderr
                    .lines()
                    .map(str::trim)
                    .rfind(|line| !line.is_empty());
                let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                match last_line {
                    Some(line) => format!("Transcoder exited with code {}: {}", code, line),
                    None => format!("Transcoder exited with code {}", code),
                }
            }
            Self::WithContext { context, source } => format!("{}: {}", context, source.summary()),
            other => other.to_string(),
        }
    }

    /// True if this error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// True if this error (or the error it wraps) is a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::WithContext { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}
