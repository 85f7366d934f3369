//! Subprocess execution for the transcoder.
//!
//! Both output streams are drained on their own tasks while the process
//! runs, so a tool that floods the stream nobody is looking at can never
//! fill its pipe and stall. The process is spawned directly (no shell) and
//! without a console window.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::{ToolOutput, ToolRunner};
use crate::error::{Error, Result};

/// Deadline for the `-version` availability check.
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// The real transcoder, invoked as a subprocess.
///
/// Construct one per application and share it; the availability check is
/// cached on the instance rather than process-wide.
#[derive(Debug)]
pub struct Transcoder {
    path: PathBuf,
    available: OnceCell<bool>,
}

impl Transcoder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            available: OnceCell::new(),
        }
    }

    /// First line of `<tool> -version`, for diagnostics.
    pub async fn version(&self) -> Option<String> {
        let args = crate::tool_args!["-version"];
        let output = run_tool(
            &self.path,
            &args,
            AVAILABILITY_TIMEOUT,
            &CancellationToken::new(),
        )
        .await
        .ok()?;
        output
            .stdout
            .lines()
            .next()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
    }
}

#[async_trait]
impl ToolRunner for Transcoder {
    fn tool_path(&self) -> &Path {
        &self.path
    }

    async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| check_availability(&self.path))
            .await
    }

    async fn run(
        &self,
        args: &[OsString],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        run_tool(&self.path, args, timeout, cancel).await
    }
}

/// True iff the tool exists and can be started.
async fn check_availability(path: &Path) -> bool {
    // A bare command name is resolved through PATH by the spawn itself
    let is_explicit_path = path.components().count() > 1;
    if is_explicit_path && !path.exists() {
        tracing::debug!(target: "runner", "Transcoder path {:?} does not exist", path);
        return false;
    }

    let args = crate::tool_args!["-version"];
    match run_tool(path, &args, AVAILABILITY_TIMEOUT, &CancellationToken::new()).await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(target: "runner", "Transcoder {:?} not invocable: {}", path, e);
            false
        }
    }
}

enum Waited<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

/// Race `future` against the deadline and the cancellation token.
async fn wait_bounded<F: Future>(
    future: F,
    deadline: tokio::time::Instant,
    cancel: &CancellationToken,
) -> Waited<F::Output> {
    tokio::select! {
        output = future => Waited::Done(output),
        _ = tokio::time::sleep_until(deadline) => Waited::TimedOut,
        _ = cancel.cancelled() => Waited::Cancelled,
    }
}

/// Spawn `tool` with `args` and wait for it under a deadline.
///
/// Cancellation observed before spawning returns immediately; observed
/// while waiting it kills the process. Exceeding `timeout` kills the
/// process and returns [`Error::Timeout`]. The exit code is reported as-is;
/// callers decide whether nonzero is a failure.
pub async fn run_tool(
    tool: &Path,
    args: &[OsString],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ToolOutput> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut command = Command::new(tool);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    hide_console_window(&mut command);

    tracing::debug!(target: "runner", "Running {:?} {:?}", tool, args);
    let started = Instant::now();

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::tool_unavailable(tool)
        } else {
            Error::Io(e).context(format!("Failed to start {}", tool.display()))
        }
    })?;

    let mut stdout_task = tokio::spawn(drain(child.stdout.take()));
    let mut stderr_task = tokio::spawn(drain(child.stderr.take()));
    let deadline = tokio::time::Instant::now() + timeout;

    let status = match wait_bounded(child.wait(), deadline, cancel).await {
        Waited::Done(Ok(status)) => status,
        Waited::Done(Err(e)) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(e.into());
        }
        Waited::TimedOut => {
            kill(&mut child).await;
            stdout_task.abort();
            stderr_task.abort();
            tracing::warn!(
                target: "runner",
                "{:?} timed out after {:?}, process killed",
                tool,
                timeout
            );
            return Err(Error::Timeout(timeout));
        }
        Waited::Cancelled => {
            kill(&mut child).await;
            stdout_task.abort();
            stderr_task.abort();
            tracing::info!(target: "runner", "{:?} cancelled, process killed", tool);
            return Err(Error::Cancelled);
        }
    };

    // Descendants of the tool can hold the pipes open after it exits
    let drained = wait_bounded(
        async {
            (
                join_drain(&mut stdout_task).await,
                join_drain(&mut stderr_task).await,
            )
        },
        deadline,
        cancel,
    )
    .await;
    let (stdout, stderr) = match drained {
        Waited::Done((stdout, stderr)) => (stdout?, stderr?),
        Waited::TimedOut => {
            stdout_task.abort();
            stderr_task.abort();
            tracing::warn!(
                target: "runner",
                "{:?} exited but its output stayed open past {:?}",
                tool,
                timeout
            );
            return Err(Error::Timeout(timeout));
        }
        Waited::Cancelled => {
            stdout_task.abort();
            stderr_task.abort();
            tracing::info!(target: "runner", "{:?} cancelled while draining output", tool);
            return Err(Error::Cancelled);
        }
    };

    tracing::debug!(
        target: "runner",
        "{:?} exited with {:?} after {:.1}s",
        tool,
        status.code(),
        started.elapsed().as_secs_f64()
    );

    Ok(ToolOutput {
        exit_code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

/// Read a pipe to EOF.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

async fn join_drain(
    task: &mut tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<Vec<u8>> {
    let bytes = task.await.map_err(std::io::Error::other)??;
    Ok(bytes)
}

/// Best-effort kill; failures are swallowed.
async fn kill(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(target: "runner", "Kill failed (process may have exited): {}", e);
    }
    let _ = child.wait().await;
}

#[cfg(windows)]
fn hide_console_window(command: &mut Command) {
    use windows_sys::Win32::System::Threading::CREATE_NO_WINDOW;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_command: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let transcoder = Transcoder::new("/nonexistent/bin/ffmpeg");
        assert!(!transcoder.is_available().await);
    }

    #[tokio::test]
    async fn test_missing_tool_run_fails_fast() {
        let args = crate::tool_args!["-version"];
        let result = run_tool(
            Path::new("/nonexistent/bin/ffmpeg"),
            &args,
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(Error::ToolUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_does_not_spawn() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        // Path doesn't exist; if we spawned we'd get ToolUnavailable instead
        let result = run_tool(
            Path::new("/nonexistent/bin/ffmpeg"),
            &[],
            Duration::from_secs(5),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn sh(script: &str) -> Vec<OsString> {
            crate::tool_args!["-c", script]
        }

        #[tokio::test]
        async fn test_captures_both_streams_and_exit_code() {
            let args = sh("echo out; echo err 1>&2; exit 3");
            let output = run_tool(
                Path::new("sh"),
                &args,
                Duration::from_secs(10),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

            assert_eq!(output.exit_code, Some(3));
            assert_eq!(output.stdout.trim(), "out");
            assert_eq!(output.stderr.trim(), "err");
            assert!(!output.success());
        }

        #[tokio::test]
        async fn test_heavy_stderr_does_not_deadlock() {
            // Well past any pipe buffer, written to the stream read second
            let args = sh("i=0; while [ $i -lt 20000 ]; do echo 'size=  1024kB time=00:00:01.00 bitrate= 128.0kbits/s' 1>&2; i=$((i+1)); done; echo done");
            let output = run_tool(
                Path::new("sh"),
                &args,
                Duration::from_secs(60),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

            assert!(output.success());
            assert_eq!(output.stdout.trim(), "done");
            assert_eq!(output.stderr.lines().count(), 20000);
        }

        #[tokio::test]
        async fn test_timeout_kills_process() {
            let args = sh("sleep 30");
            let started = Instant::now();
            let result = run_tool(
                Path::new("sh"),
                &args,
                Duration::from_millis(200),
                &CancellationToken::new(),
            )
            .await;

            assert!(matches!(result, Err(Error::Timeout(_))));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn test_cancellation_during_wait_kills_process() {
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                trigger.cancel();
            });

            let args = sh("sleep 30");
            let started = Instant::now();
            let result = run_tool(Path::new("sh"), &args, Duration::from_secs(60), &cancel).await;

            assert!(matches!(result, Err(Error::Cancelled)));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn test_timeout_covers_output_held_by_descendant() {
            // The shell exits at once; the background sleep keeps both pipes open
            let args = sh("sleep 5 & echo started");
            let started = Instant::now();
            let result = run_tool(
                Path::new("sh"),
                &args,
                Duration::from_millis(200),
                &CancellationToken::new(),
            )
            .await;

            assert!(matches!(result, Err(Error::Timeout(_))));
            assert!(started.elapsed() < Duration::from_secs(3));
        }

        #[tokio::test]
        async fn test_cancellation_covers_output_held_by_descendant() {
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                trigger.cancel();
            });

            let args = sh("sleep 5 & echo started");
            let started = Instant::now();
            let result = run_tool(Path::new("sh"), &args, Duration::from_secs(60), &cancel).await;

            assert!(matches!(result, Err(Error::Cancelled)));
            assert!(started.elapsed() < Duration::from_secs(3));
        }

        #[tokio::test]
        async fn test_availability_is_cached_per_instance() {
            let transcoder = Transcoder::new("sh");
            assert!(transcoder.is_available().await);
            // Second call hits the cached flag
            assert!(transcoder.is_available().await);
        }
    }
}
