//! Test utilities and fixtures for music-mender tests.
//!
//! This module provides sample transcoder logs, probe fixtures, a temp
//! library layout and [`MockRunner`], a scripted [`ToolRunner`] that never
//! spawns a process.
//!
//! # Example
//!
//! ```ignore
//! use music_mender::test_utils::{MockRunner, TempLibrary, SILENCE_LOG};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let library = TempLibrary::new();
//!     let song = library.add_file("item-1", "song.mp3", b"original");
//!     let runner = MockRunner::new().with_silence_log(SILENCE_LOG);
//!     // ... test logic
//! }
//! ```

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::archive::PreservedArchive;
use crate::error::{Error, Result};
use crate::probe::ProbeResult;
use crate::tool::{ToolOutput, ToolRunner};

/// Probe report for a 320 kb/s, 48 kHz stereo mp3.
pub const MP3_PROBE_LOG: &str = "\
Input #0, mp3, from '/music/item-1/song.mp3':
  Metadata:
    title           : Song
    artist          : Artist
  Duration: 00:04:05.52, start: 0.025057, bitrate: 320 kb/s
  Stream #0:0: Audio: mp3 (mp3float), 48000 Hz, stereo, fltp, 320 kb/s
  Stream #0:1: Video: mjpeg (Baseline), yuvj420p(pc, bt470bg/unknown/unknown), 500x500, 90k tbr, 90k tbn (attached pic)
At least one output file must be specified
";

/// `silencedetect` output with 2.345 s of leading silence and a gap mid-track.
pub const SILENCE_LOG: &str = "\
Input #0, mp3, from 'song.mp3':
  Duration: 00:03:20.00, start: 0.000000, bitrate: 192 kb/s
  Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 192 kb/s
[silencedetect @ 0x55d5c8a3c2c0] silence_start: 0
[silencedetect @ 0x55d5c8a3c2c0] silence_end: 2.345 | silence_duration: 2.345
[silencedetect @ 0x55d5c8a3c2c0] silence_start: 120.5
[silencedetect @ 0x55d5c8a3c2c0] silence_end: 121.25 | silence_duration: 0.75
size=N/A time=00:03:20.00 bitrate=N/A speed= 512x
";

/// `silencedetect` output with only 0.2 s of leading silence.
pub const SHORT_SILENCE_LOG: &str = "\
  Duration: 00:03:20.00, start: 0.000000, bitrate: 192 kb/s
[silencedetect @ 0x1] silence_start: 0
[silencedetect @ 0x1] silence_end: 0.2 | silence_duration: 0.2
";

/// `silencedetect` output for a track that starts with audio.
pub const NO_SILENCE_LOG: &str = "\
  Duration: 00:03:20.00, start: 0.000000, bitrate: 192 kb/s
[silencedetect @ 0x1] silence_start: 60
[silencedetect @ 0x1] silence_end: 61.5 | silence_duration: 1.5
";

/// First-pass `loudnorm` measurement.
pub const LOUDNORM_LOG: &str = r#"Input #0, flac, from 'song.flac':
  Duration: 00:03:00.00, start: 0.000000, bitrate: 900 kb/s
  Stream #0:0: Audio: flac, 44100 Hz, stereo, s16
[Parsed_loudnorm_0 @ 0x5581c2f0e940]
{
	"input_i" : "-27.61",
	"input_tp" : "-4.47",
	"input_lra" : "18.06",
	"input_thresh" : "-39.20",
	"output_i" : "-16.58",
	"output_tp" : "-1.50",
	"output_lra" : "14.70",
	"output_thresh" : "-27.51",
	"normalization_type" : "dynamic",
	"target_offset" : "0.58"
}
"#;

/// Transform that dies on a damaged stream.
pub const DECODE_FAILURE_LOG: &str = "\
Input #0, mp3, from 'broken.mp3':
  Duration: 00:03:20.00, start: 0.000000, bitrate: 192 kb/s
  Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 192 kb/s
[mp3float @ 0x55d5c8a3c2c0] Header missing
Error while decoding stream #0:0: Invalid data found when processing input
Conversion failed!
";

/// A probe with no issues.
pub fn clean_probe() -> ProbeResult {
    ProbeResult {
        file_path: PathBuf::from("/music/item-1/song.mp3"),
        success: true,
        format: "mp3".to_string(),
        codec: "mp3".to_string(),
        bitrate_kbps: Some(192),
        sample_rate_hz: Some(44100),
        channels: Some(2),
        duration_seconds: Some(205.1),
        error_message: None,
        issues: crate::probe::IssueSet::empty(),
    }
}

/// A music library and archive root inside one temp directory.
///
/// Layout: `<root>/music/<itemId>/<file>` and `<root>/preserved/`.
pub struct TempLibrary {
    pub dir: TempDir,
}

impl Default for TempLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl TempLibrary {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        std::fs::create_dir_all(dir.path().join("music")).expect("Failed to create music dir");
        Self { dir }
    }

    pub fn music_dir(&self) -> PathBuf {
        self.dir.path().join("music")
    }

    pub fn archive_root(&self) -> PathBuf {
        self.dir.path().join("preserved")
    }

    pub fn archive(&self) -> PreservedArchive {
        PreservedArchive::new(self.archive_root())
    }

    /// Write `contents` to `music/<item>/<name>` and return its path.
    pub fn add_file(&self, item: &str, name: &str, contents: &[u8]) -> PathBuf {
        let item_dir = self.music_dir().join(item);
        std::fs::create_dir_all(&item_dir).expect("Failed to create item dir");
        let path = item_dir.join(name);
        std::fs::write(&path, contents).expect("Failed to write file");
        path
    }

    /// Names of all files under `music/<item>`.
    pub fn files_in(&self, item: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.music_dir().join(item))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// What the mock writes for a transform invocation.
#[derive(Debug, Clone)]
pub enum MockOutput {
    /// Write these bytes to the output path and exit 0
    Write(Vec<u8>),
    /// Create an empty output file and exit 0
    Empty,
    /// Write nothing and exit with this code
    Fail(i32),
}

/// Scripted transcoder for tests.
///
/// Classifies each invocation by its arguments: probes (input only),
/// analysis passes (`-f null -`) and transforms (last argument is the
/// output path). Tracks invocation counts and peak concurrency.
#[derive(Clone)]
pub struct MockRunner {
    inner: Arc<MockState>,
}

struct MockState {
    available: bool,
    probe_log: String,
    probe_exit_code: i32,
    silence_log: String,
    loudnorm_log: String,
    output: MockOutput,
    fail_inputs: Vec<String>,
    delay: Duration,
    invocations: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<Vec<OsString>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockState {
                available: true,
                probe_log: MP3_PROBE_LOG.to_string(),
                probe_exit_code: 1,
                silence_log: SILENCE_LOG.to_string(),
                loudnorm_log: LOUDNORM_LOG.to_string(),
                output: MockOutput::Write(b"transcoded audio".to_vec()),
                fail_inputs: Vec::new(),
                delay: Duration::ZERO,
                invocations: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A runner whose tool is missing.
    pub fn unavailable() -> Self {
        Self::new().configure(|s| s.available = false)
    }

    pub fn with_probe_log(self, log: &str) -> Self {
        self.configure(|s| s.probe_log = log.to_string())
    }

    pub fn with_probe_exit_code(self, code: i32) -> Self {
        self.configure(|s| s.probe_exit_code = code)
    }

    pub fn with_silence_log(self, log: &str) -> Self {
        self.configure(|s| s.silence_log = log.to_string())
    }

    pub fn with_loudnorm_log(self, log: &str) -> Self {
        self.configure(|s| s.loudnorm_log = log.to_string())
    }

    pub fn with_output(self, output: MockOutput) -> Self {
        self.configure(|s| s.output = output)
    }

    /// Transforms whose input path contains `pattern` exit with code 1.
    pub fn failing_inputs_containing(self, pattern: &str) -> Self {
        self.configure(|s| s.fail_inputs.push(pattern.to_string()))
    }

    /// Each invocation sleeps this long (cancellable).
    pub fn with_delay(self, delay: Duration) -> Self {
        self.configure(|s| s.delay = delay)
    }

    fn configure(self, f: impl FnOnce(&mut MockState)) -> Self {
        let mut state = Arc::try_unwrap(self.inner)
            .unwrap_or_else(|_| panic!("configure MockRunner before sharing it"));
        f(&mut state);
        Self {
            inner: Arc::new(state),
        }
    }

    pub fn invocations(&self) -> usize {
        self.inner.invocations.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous invocations observed.
    pub fn peak_concurrency(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    /// Arguments of every invocation, in call order.
    pub fn calls(&self) -> Vec<Vec<OsString>> {
        self.inner.calls.lock().clone()
    }

    /// Arguments of every invocation joined into one string each.
    pub fn call_lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|args| {
                args.iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    fn respond(&self, args: &[OsString]) -> Result<ToolOutput> {
        let state = &self.inner;
        let input = arg_after(args, "-i");
        let joined = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");

        let is_null_output = joined.contains("-f null");
        if is_null_output && joined.contains("silencedetect") {
            return Ok(stderr_output(0, &state.silence_log));
        }
        if is_null_output && joined.contains("print_format=json") {
            return Ok(stderr_output(0, &state.loudnorm_log));
        }

        let output_path = args.last().map(PathBuf::from);
        let is_probe = output_path.as_deref() == input.as_deref();
        if is_probe {
            return Ok(stderr_output(state.probe_exit_code, &state.probe_log));
        }

        let input_str = input
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        if state.fail_inputs.iter().any(|p| input_str.contains(p)) {
            return Ok(stderr_output(1, DECODE_FAILURE_LOG));
        }

        let output_path = output_path.unwrap_or_default();
        match &state.output {
            MockOutput::Write(bytes) => {
                std::fs::write(&output_path, bytes)?;
                Ok(stderr_output(0, "size=    4096kB time=00:03:20.00 bitrate= 167.8kbits/s"))
            }
            MockOutput::Empty => {
                std::fs::write(&output_path, b"")?;
                Ok(stderr_output(0, ""))
            }
            MockOutput::Fail(code) => Ok(stderr_output(*code, "Conversion failed!")),
        }
    }
}

fn arg_after(args: &[OsString], flag: &str) -> Option<PathBuf> {
    args.iter()
        .position(|a| a.as_os_str() == OsStr::new(flag))
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn stderr_output(code: i32, stderr: &str) -> ToolOutput {
    ToolOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl ToolRunner for MockRunner {
    fn tool_path(&self) -> &Path {
        Path::new("mock-ffmpeg")
    }

    async fn is_available(&self) -> bool {
        self.inner.available
    }

    async fn run(
        &self,
        args: &[OsString],
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let state = &self.inner;
        state.invocations.fetch_add(1, Ordering::SeqCst);
        state.calls.lock().push(args.to_vec());

        let now = state.running.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak.fetch_max(now, Ordering::SeqCst);

        let waited = if state.delay.is_zero() {
            Ok(())
        } else {
            tokio::select! {
                _ = tokio::time::sleep(state.delay) => Ok(()),
                _ = cancel.cancelled() => Err(Error::Cancelled),
            }
        };
        let result = waited.and_then(|_| self.respond(args));

        state.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_library_layout() {
        let library = TempLibrary::new();
        let path = library.add_file("item-7", "song.mp3", b"abc");

        assert!(path.starts_with(library.music_dir().join("item-7")));
        assert_eq!(library.files_in("item-7"), vec!["song.mp3".to_string()]);
        assert!(library.files_in("missing").is_empty());
    }

    #[tokio::test]
    async fn test_mock_classifies_probe_and_transform() {
        let library = TempLibrary::new();
        let input = library.add_file("item", "song.mp3", b"abc");
        let output = library.music_dir().join("item").join("out.mp3");
        let runner = MockRunner::new();
        let cancel = CancellationToken::new();

        let probe = runner
            .run(&crate::tool_args!["-i", &input], Duration::from_secs(1), &cancel)
            .await
            .unwrap();
        assert_eq!(probe.exit_code, Some(1));
        assert!(probe.stderr.contains("Duration"));

        let transform = runner
            .run(
                &crate::tool_args!["-i", &input, "-y", &output],
                Duration::from_secs(1),
                &cancel,
            )
            .await
            .unwrap();
        assert!(transform.success());
        assert_eq!(std::fs::read(&output).unwrap(), b"transcoded audio");
        assert_eq!(runner.invocations(), 2);
    }
}
