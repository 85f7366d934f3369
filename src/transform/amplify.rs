//! Amplify: apply a fixed gain in dB.

use std::ffi::OsString;
use std::path::Path;

use super::codec::encoder_for_path;

/// Gains smaller than this (in either direction) are not worth a re-encode.
pub const MIN_GAIN_DB: f64 = 0.1;

pub fn is_negligible(gain_db: f64) -> bool {
    !gain_db.is_finite() || gain_db.abs() < MIN_GAIN_DB
}

pub fn amplify_args(input: &Path, output: &Path, gain_db: f64) -> Vec<OsString> {
    let mut args = crate::tool_args![
        "-hide_banner",
        "-nostats",
        "-y",
        "-i",
        input,
        "-af",
        format!("volume={:.2}dB", gain_db),
        "-map_metadata",
        "0",
    ];
    args.extend(encoder_for_path(output).args());
    args.push(output.into());
    args
}
