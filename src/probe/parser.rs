//! Parsing of the transcoder's free-text diagnostics.
//!
//! The tool writes its report to stderr in FFmpeg's conventional log
//! format. Nothing here fails: a field that cannot be found is simply
//! `None`, so a change in the log format degrades to "unknown" values.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d{1,2}):(\d{1,2}(?:\.\d+)?)").expect("valid regex")
});

static BITRATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bitrate:\s*(\d+)\s*kb/s").expect("valid regex"));

static INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Input #\d+,\s*([^,]+),").expect("valid regex"));

static AUDIO_STREAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Stream #\d+:\d+[^:]*:\s*Audio:\s*(.+)").expect("valid regex"));

static SAMPLE_RATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*Hz$").expect("valid regex"));

static STREAM_BITRATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*kb/s").expect("valid regex"));

static CHANNELS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*channels").expect("valid regex"));

static SILENCE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"silence_start:\s*(-?\d+(?:\.\d+)?)").expect("valid regex"));

static SILENCE_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"silence_end:\s*(-?\d+(?:\.\d+)?)\s*\|\s*silence_duration:\s*(\d+(?:\.\d+)?)")
        .expect("valid regex")
});

/// Fields recovered from one diagnostic dump.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticFields {
    /// Container format from the `Input #0, <format>, from` line
    pub format: Option<String>,
    /// Codec of the first audio stream
    pub codec: Option<String>,
    pub duration_seconds: Option<f64>,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate_hz: Option<u32>,
    pub channels: Option<u32>,
}

impl DiagnosticFields {
    /// True if nothing at all could be recovered.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Extract duration, bitrate and first-audio-stream properties.
pub fn parse_diagnostics(text: &str) -> DiagnosticFields {
    if text.trim().is_empty() {
        return DiagnosticFields::default();
    }

    let mut fields = DiagnosticFields {
        format: INPUT_RE
            .captures(text)
            .map(|c| c[1].trim().to_string())
            .filter(|s| !s.is_empty()),
        duration_seconds: parse_duration(text),
        bitrate_kbps: BITRATE_RE
            .captures(text)
            .and_then(|c| c[1].parse().ok()),
        ..Default::default()
    };

    if let Some(stream) = AUDIO_STREAM_RE.captures(text) {
        apply_audio_stream(&mut fields, &stream[1]);
    }

    fields
}

/// `HH:MM:SS.cc` after `Duration:` converted to seconds.
pub fn parse_duration(text: &str) -> Option<f64> {
    let caps = DURATION_RE.captures(text)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Fill codec, sample rate and channels from the text after `Audio:`.
///
/// Example: `mp3 (mp3float), 44100 Hz, stereo, fltp, 192 kb/s`
fn apply_audio_stream(fields: &mut DiagnosticFields, description: &str) {
    let parts: Vec<&str> = description.split(',').map(str::trim).collect();

    fields.codec = parts
        .first()
        .and_then(|p| p.split_whitespace().next())
        .map(str::to_string);

    let mut after_rate = false;
    for part in parts.iter().skip(1) {
        if let Some(caps) = SAMPLE_RATE_RE.captures(part) {
            fields.sample_rate_hz = caps[1].parse().ok();
            after_rate = true;
            continue;
        }
        if after_rate && fields.channels.is_none() {
            fields.channels = channel_count(part);
            after_rate = false;
        }
        if fields.bitrate_kbps.is_none() {
            if let Some(caps) = STREAM_BITRATE_RE.captures(part) {
                fields.bitrate_kbps = caps[1].parse().ok();
            }
        }
    }
}

/// Channel count from a channel-layout word.
pub fn channel_count(layout: &str) -> Option<u32> {
    let layout = layout.trim();
    if let Some(caps) = CHANNELS_RE.captures(layout) {
        return caps[1].parse().ok();
    }
    // Strip qualifiers like "5.1(side)"
    let base = layout.split('(').next().unwrap_or(layout).trim();
    match base {
        "mono" => Some(1),
        "stereo" | "downmix" => Some(2),
        "2.1" | "3.0" => Some(3),
        "quad" | "4.0" | "3.1" => Some(4),
        "4.1" | "5.0" => Some(5),
        "5.1" | "6.0" => Some(6),
        "6.1" | "7.0" => Some(7),
        "7.1" => Some(8),
        _ => None,
    }
}

// ============================================================================
// Silence detection
// ============================================================================

/// A quiet stretch reported by the `silencedetect` filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceInterval {
    pub start: f64,
    /// `None` if the silence ran to end of file without a closing marker
    pub end: Option<f64>,
    pub duration: Option<f64>,
}

/// Pair `silence_start` / `silence_end` markers in the order they appear.
///
/// A trailing start without an end is closed at `file_duration` when known.
pub fn parse_silence(text: &str, file_duration: Option<f64>) -> Vec<SilenceInterval> {
    let mut markers: Vec<(usize, Marker)> = Vec::new();
    for caps in SILENCE_START_RE.captures_iter(text) {
        if let (Some(m), Ok(start)) = (caps.get(0), caps[1].parse::<f64>()) {
            markers.push((m.start(), Marker::Start(start)));
        }
    }
    for caps in SILENCE_END_RE.captures_iter(text) {
        if let (Some(m), Ok(end), Ok(duration)) =
            (caps.get(0), caps[1].parse::<f64>(), caps[2].parse::<f64>())
        {
            markers.push((m.start(), Marker::End(end, duration)));
        }
    }
    markers.sort_by_key(|(offset, _)| *offset);

    let mut intervals = Vec::new();
    let mut open: Option<f64> = None;
    for (_, marker) in markers {
        match marker {
            Marker::Start(start) => {
                if let Some(previous) = open.replace(start) {
                    // Two starts in a row; keep the first as unterminated
                    intervals.push(SilenceInterval {
                        start: previous,
                        end: None,
                        duration: None,
                    });
                }
            }
            Marker::End(end, duration) => {
                let start = open.take().unwrap_or((end - duration).max(0.0));
                intervals.push(SilenceInterval {
                    start,
                    end: Some(end),
                    duration: Some(duration),
                });
            }
        }
    }
    if let Some(start) = open {
        intervals.push(SilenceInterval {
            start,
            end: file_duration,
            duration: file_duration.map(|d| (d - start).max(0.0)),
        });
    }
    intervals
}

enum Marker {
    Start(f64),
    End(f64, f64),
}

/// The silence that begins at the start of the file, if any.
///
/// Detection can report the first silence slightly after zero, so a start
/// within `tolerance` seconds still counts as leading.
pub fn leading_silence(intervals: &[SilenceInterval], tolerance: f64) -> Option<SilenceInterval> {
    intervals
        .first()
        .filter(|interval| interval.start <= tolerance && interval.end.is_some())
        .copied()
}

// ============================================================================
// Loudness measurement
// ============================================================================

/// First-pass loudness measurement from the `loudnorm` filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessMeasurement {
    pub input_i: f64,
    pub input_tp: f64,
    pub input_lra: f64,
    pub input_thresh: f64,
    pub target_offset: f64,
}

impl LoudnessMeasurement {
    /// Digital silence measures as `-inf`, which cannot feed a second pass.
    pub fn is_finite(&self) -> bool {
        [
            self.input_i,
            self.input_tp,
            self.input_lra,
            self.input_thresh,
            self.target_offset,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// The filter prints every value as a JSON string.
#[derive(Deserialize)]
struct LoudnormJson {
    input_i: String,
    input_tp: String,
    input_lra: String,
    input_thresh: String,
    target_offset: String,
}

/// Parse the JSON block printed by `loudnorm=...:print_format=json`.
///
/// The block is the last `{ ... }` in the log.
pub fn parse_loudness_measurement(text: &str) -> Option<LoudnessMeasurement> {
    let end = text.rfind('}')?;
    let start = text[..end].rfind('{')?;
    let raw: LoudnormJson = serde_json::from_str(&text[start..=end]).ok()?;

    Some(LoudnessMeasurement {
        input_i: raw.input_i.trim().parse().ok()?,
        input_tp: raw.input_tp.trim().parse().ok()?,
        input_lra: raw.input_lra.trim().parse().ok()?,
        input_thresh: raw.input_thresh.trim().parse().ok()?,
        target_offset: raw.target_offset.trim().parse().ok()?,
    })
}
