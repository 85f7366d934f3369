//! Repair: re-encode to a standard sample rate and channel layout.
//!
//! Decoding errors are tolerated so damaged frames are dropped rather than
//! aborting the whole file.

use std::ffi::OsString;
use std::path::Path;

use super::codec::encoder_for_path;

/// Sample rate written by a repair.
pub const STANDARD_SAMPLE_RATE: u32 = 44100;

/// Channel count written by a repair.
pub const STANDARD_CHANNELS: u32 = 2;

pub fn repair_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = crate::tool_args![
        "-hide_banner",
        "-nostats",
        "-y",
        "-err_detect",
        "ignore_err",
        "-i",
        input,
        "-map_metadata",
        "0",
        "-ar",
        STANDARD_SAMPLE_RATE.to_string(),
        "-ac",
        STANDARD_CHANNELS.to_string(),
    ];
    args.extend(encoder_for_path(output).args());
    args.push(output.into());
    args
}
