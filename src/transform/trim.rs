//! Trim: remove leading silence.
//!
//! A `silencedetect` pass finds the quiet stretch at the start of the file;
//! the cut lands a small buffer before its end so fade-ins survive.

use std::ffi::OsString;
use std::path::Path;

use super::SkipReason;
use super::codec::{encoder_for_path, trims_by_stream_copy};
use crate::config::TransformSettings;
use crate::probe::parser::{leading_silence, parse_duration, parse_silence};

/// Silence must start this close to zero to count as leading (seconds).
pub const LEADING_TOLERANCE: f64 = 0.1;

/// Decision after silence analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrimPlan {
    /// Cut everything before `start` seconds
    Cut { start: f64, silence_end: f64 },
    Skip(SkipReason),
}

/// True if the file name already carries the trim suffix.
pub fn is_already_trimmed(path: &Path, suffix: &str) -> bool {
    !suffix.is_empty()
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem.ends_with(suffix))
}

/// Arguments for the silence analysis pass.
pub fn detect_args(input: &Path, settings: &TransformSettings) -> Vec<OsString> {
    crate::tool_args![
        "-hide_banner",
        "-nostats",
        "-i",
        input,
        "-af",
        format!(
            "silencedetect=noise={}dB:d={}",
            settings.silence_threshold_db, settings.min_silence_duration
        ),
        "-f",
        "null",
        "-",
    ]
}

/// Decide whether and where to cut from the analysis log.
pub fn plan_trim(analysis: &str, settings: &TransformSettings) -> TrimPlan {
    let duration = parse_duration(analysis);
    let intervals = parse_silence(analysis, duration);

    let Some(silence) = leading_silence(&intervals, LEADING_TOLERANCE) else {
        return TrimPlan::Skip(SkipReason::NoLeadingSilence);
    };
    let Some(silence_end) = silence.end else {
        return TrimPlan::Skip(SkipReason::NoLeadingSilence);
    };

    if let Some(duration) = duration {
        if silence_end >= duration - LEADING_TOLERANCE {
            return TrimPlan::Skip(SkipReason::EntirelySilent);
        }
    }
    if silence_end < settings.min_silence_to_trim {
        return TrimPlan::Skip(SkipReason::SilenceTooShort {
            seconds: silence_end,
        });
    }

    let start = (silence_end - settings.trim_buffer.as_secs_f64()).max(0.0);
    TrimPlan::Cut { start, silence_end }
}

/// Arguments for the cut itself.
pub fn trim_args(input: &Path, output: &Path, start: f64) -> Vec<OsString> {
    let start = format!("{:.3}", start);
    if trims_by_stream_copy(input) {
        return crate::tool_args![
            "-hide_banner",
            "-nostats",
            "-y",
            "-ss",
            start,
            "-i",
            input,
            "-map_metadata",
            "0",
            "-c",
            "copy",
            output,
        ];
    }

    let mut args = crate::tool_args![
        "-hide_banner",
        "-nostats",
        "-y",
        "-i",
        input,
        "-af",
        format!("atrim=start={},asetpts=PTS-STARTPTS", start),
        "-map_metadata",
        "0",
    ];
    args.extend(encoder_for_path(output).args());
    args.push(output.into());
    args
}
