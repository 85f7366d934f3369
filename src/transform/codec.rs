//! Encoder selection by file extension.
//!
//! Lossy formats are re-encoded at a fixed high-quality setting, lossless
//! formats keep a lossless codec. Containers that can carry cover art keep
//! the attached picture stream as-is.

use std::ffi::OsString;
use std::path::Path;

/// Encoder settings for one output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderProfile {
    pub codec: &'static str,
    /// Quality flags following `-c:a <codec>`
    pub quality: &'static [&'static str],
    pub lossless: bool,
    /// Container can hold an attached picture
    pub keeps_cover_art: bool,
}

const MP3: EncoderProfile = EncoderProfile {
    codec: "libmp3lame",
    quality: &["-b:a", "320k"],
    lossless: false,
    keeps_cover_art: true,
};

/// Profile for a file extension (case-insensitive, without the dot).
pub fn encoder_for(extension: &str) -> EncoderProfile {
    match extension.to_ascii_lowercase().as_str() {
        "mp3" => MP3,
        "ogg" | "oga" => EncoderProfile {
            codec: "libvorbis",
            quality: &["-q:a", "8"],
            lossless: false,
            keeps_cover_art: false,
        },
        "opus" => EncoderProfile {
            codec: "libopus",
            quality: &["-b:a", "192k"],
            lossless: false,
            keeps_cover_art: false,
        },
        "m4a" | "aac" => EncoderProfile {
            codec: "aac",
            quality: &["-b:a", "256k"],
            lossless: false,
            keeps_cover_art: true,
        },
        "flac" => EncoderProfile {
            codec: "flac",
            quality: &[],
            lossless: true,
            keeps_cover_art: true,
        },
        "wav" => EncoderProfile {
            codec: "pcm_s16le",
            quality: &[],
            lossless: true,
            keeps_cover_art: false,
        },
        _ => MP3,
    }
}

/// Profile for a path's extension.
pub fn encoder_for_path(path: &Path) -> EncoderProfile {
    encoder_for(path.extension().and_then(|e| e.to_str()).unwrap_or(""))
}

impl EncoderProfile {
    /// `-c:a ... [-c:v copy | -vn]` argument block.
    pub fn args(&self) -> Vec<OsString> {
        let mut args = crate::tool_args!["-c:a", self.codec];
        args.extend(self.quality.iter().map(OsString::from));
        if self.keeps_cover_art {
            args.extend(crate::tool_args!["-c:v", "copy"]);
        } else {
            args.push(OsString::from("-vn"));
        }
        args
    }
}

/// Formats trimmed by stream copy instead of re-encoding.
///
/// Cutting these at a frame boundary avoids a lossy generation; the cut
/// granularity is well inside the trim buffer.
pub fn trims_by_stream_copy(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("mp3" | "m4a" | "aac")
    )
}
