//! Normalize: two-pass EBU R128 loudness normalization.
//!
//! Pass one measures the file with `loudnorm` and prints JSON; pass two
//! applies a linear correction using those measurements.

use std::ffi::OsString;
use std::path::Path;

use super::codec::encoder_for_path;
use crate::config::LoudnessTarget;
use crate::probe::parser::LoudnessMeasurement;

/// Sample rate used when the measurement pass did not report one.
const FALLBACK_SAMPLE_RATE: u32 = 44100;

fn target_filter(target: &LoudnessTarget) -> String {
    format!(
        "loudnorm=I={}:TP={}:LRA={}",
        target.integrated_lufs, target.true_peak_db, target.loudness_range
    )
}

/// Arguments for the measurement pass.
pub fn measure_args(input: &Path, target: &LoudnessTarget) -> Vec<OsString> {
    crate::tool_args![
        "-hide_banner",
        "-nostats",
        "-i",
        input,
        "-af",
        format!("{}:print_format=json", target_filter(target)),
        "-f",
        "null",
        "-",
    ]
}

/// Arguments for the correction pass.
///
/// `loudnorm` resamples internally, so the output rate is pinned to the
/// input's.
pub fn correct_args(
    input: &Path,
    output: &Path,
    target: &LoudnessTarget,
    measured: &LoudnessMeasurement,
    sample_rate: Option<u32>,
) -> Vec<OsString> {
    let filter = format!(
        "{}:measured_I={}:measured_TP={}:measured_LRA={}:measured_thresh={}:offset={}:linear=true:print_format=summary",
        target_filter(target),
        measured.input_i,
        measured.input_tp,
        measured.input_lra,
        measured.input_thresh,
        measured.target_offset
    );

    let mut args = crate::tool_args![
        "-hide_banner",
        "-nostats",
        "-y",
        "-i",
        input,
        "-af",
        filter,
        "-ar",
        sample_rate.unwrap_or(FALLBACK_SAMPLE_RATE).to_string(),
        "-map_metadata",
        "0",
    ];
    args.extend(encoder_for_path(output).args());
    args.push(output.into());
    args
}
