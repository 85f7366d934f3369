//! External transcoder access.
//!
//! All audio work is delegated to an FFmpeg-compatible command-line tool.
//! The [`ToolRunner`] trait is the seam between the transforms and the
//! real subprocess: production code uses [`Transcoder`], tests substitute a
//! scripted runner.
//!
//! # Example
//!
//! ```ignore
//! use music_mender::tool::{ToolRunner, Transcoder};
//!
//! let transcoder = Transcoder::new("ffmpeg");
//! if transcoder.is_available().await {
//!     let output = transcoder.run(&args, Duration::from_secs(30), &cancel).await?;
//!     println!("{}", output.stderr);
//! }
//! ```

mod process;

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

pub use process::{Transcoder, run_tool};

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the tool exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Treat a nonzero exit as a failure (transform invocations).
    ///
    /// Probe invocations skip this: some tools exit nonzero when asked only
    /// for diagnostics.
    pub fn require_success(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::tool_failed(self.exit_code, self.stderr.trim().to_string()))
        }
    }
}

/// Runs the external transcoder.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Path of the tool this runner invokes (for logging).
    fn tool_path(&self) -> &Path;

    /// Whether the tool exists and can be invoked. Never fails.
    async fn is_available(&self) -> bool;

    /// Run the tool with `args`, draining both output streams.
    ///
    /// Returns [`Error::Timeout`] after killing the process if it runs past
    /// `timeout`, and [`Error::Cancelled`] if `cancel` fires first.
    async fn run(
        &self,
        args: &[OsString],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput>;
}

/// Build an argument vector from mixed string and path pieces.
#[macro_export]
macro_rules! tool_args {
    ($($arg:expr),* $(,)?) => {
        vec![$(::std::ffi::OsString::from($arg)),*]
    };
}
