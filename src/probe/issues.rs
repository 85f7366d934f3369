//! Issue classification for probed audio files.
//!
//! [`detect_issues`] is a pure function of a [`ProbeResult`]: the same
//! probe always yields the same [`IssueSet`].
//!
//! # Thresholds
//!
//! - Bitrate above 500 kb/s is very high, below 32 kb/s very low
//! - Sample rates outside [`STANDARD_SAMPLE_RATES`] are unusual
//! - A probe that recovered neither format nor codec has corrupt headers

use bitflags::bitflags;

use super::ProbeResult;

/// Bitrate above which a file is flagged (kb/s, exclusive).
pub const VERY_HIGH_BITRATE_KBPS: u32 = 500;

/// Bitrate below which a file is flagged (kb/s, exclusive).
pub const VERY_LOW_BITRATE_KBPS: u32 = 32;

/// Sample rates considered normal.
pub const STANDARD_SAMPLE_RATES: &[u32] = &[
    8000, 11025, 16000, 22050, 32000, 44100, 48000, 96000,
];

bitflags! {
    /// Problems found in a probed file.
    ///
    /// Use `.is_empty()` (or [`IssueSet::has_any_issue`]) to check for a
    /// clean file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IssueSet: u32 {
        const MISSING_BITRATE = 1 << 0;
        const MISSING_SAMPLE_RATE = 1 << 1;
        const MISSING_DURATION = 1 << 2;
        /// Diagnostics were empty or unreadable
        const CORRUPT_HEADERS = 1 << 3;
        /// Sample rate is not a standard rate
        const UNUSUAL_ENCODING = 1 << 4;
        const VERY_HIGH_BITRATE = 1 << 5;
        const VERY_LOW_BITRATE = 1 << 6;

        /// Issues a repair pass can fix
        const REPAIRABLE = Self::MISSING_BITRATE.bits()
            | Self::MISSING_SAMPLE_RATE.bits()
            | Self::MISSING_DURATION.bits()
            | Self::CORRUPT_HEADERS.bits()
            | Self::UNUSUAL_ENCODING.bits();
    }
}

impl IssueSet {
    /// OR of every flag.
    pub fn has_any_issue(&self) -> bool {
        !self.is_empty()
    }

    /// Get human-readable descriptions of all set flags.
    pub fn descriptions(&self) -> Vec<&'static str> {
        let mut descs = Vec::new();

        if self.contains(Self::MISSING_BITRATE) {
            descs.push("Missing bitrate");
        }
        if self.contains(Self::MISSING_SAMPLE_RATE) {
            descs.push("Missing sample rate");
        }
        if self.contains(Self::MISSING_DURATION) {
            descs.push("Missing duration");
        }
        if self.contains(Self::CORRUPT_HEADERS) {
            descs.push("Corrupt or unreadable headers");
        }
        if self.contains(Self::UNUSUAL_ENCODING) {
            descs.push("Unusual sample rate");
        }
        if self.contains(Self::VERY_HIGH_BITRATE) {
            descs.push("Very high bitrate");
        }
        if self.contains(Self::VERY_LOW_BITRATE) {
            descs.push("Very low bitrate");
        }

        descs
    }

    /// Short status icon for CLI listings.
    pub fn summary_icon(&self) -> &'static str {
        if self.is_empty() {
            "✓"
        } else if self.contains(Self::CORRUPT_HEADERS) {
            "✗"
        } else if self.intersects(Self::REPAIRABLE) {
            "⚠"
        } else {
            "·"
        }
    }
}

/// Classify a probe into the fixed issue taxonomy.
pub fn detect_issues(result: &ProbeResult) -> IssueSet {
    let mut issues = IssueSet::empty();

    let bitrate = result.bitrate_kbps.filter(|&b| b > 0);
    let sample_rate = result.sample_rate_hz.filter(|&r| r > 0);

    if bitrate.is_none() {
        issues |= IssueSet::MISSING_BITRATE;
    }
    if sample_rate.is_none() {
        issues |= IssueSet::MISSING_SAMPLE_RATE;
    }
    if !result.duration_seconds.is_some_and(|d| d > 0.0) {
        issues |= IssueSet::MISSING_DURATION;
    }
    if !result.has_known_format() && !result.has_known_codec() {
        issues |= IssueSet::CORRUPT_HEADERS;
    }
    if let Some(rate) = sample_rate {
        if !STANDARD_SAMPLE_RATES.contains(&rate) {
            issues |= IssueSet::UNUSUAL_ENCODING;
        }
    }
    if let Some(kbps) = bitrate {
        if kbps > VERY_HIGH_BITRATE_KBPS {
            issues |= IssueSet::VERY_HIGH_BITRATE;
        }
        if kbps < VERY_LOW_BITRATE_KBPS {
            issues |= IssueSet::VERY_LOW_BITRATE;
        }
    }

    issues
}
