//! Music Mender - An audio file repair and cleanup library.
//!
//! This library provides tools for probing, repairing, normalizing, trimming
//! and amplifying music files. Audio work is delegated to an external
//! FFmpeg-compatible transcoder; originals are archived before replacement.
//! It can be driven from the `music-mender` CLI or embedded in a player.

pub mod archive;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod playback;
pub mod probe;
#[cfg(test)]
pub mod test_utils;
pub mod tool;
pub mod transform;

pub use error::{Error, Result};
