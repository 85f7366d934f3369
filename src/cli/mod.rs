//! Command-line interface for music-mender.
//!
//! This module provides CLI commands for probing, analyzing and transforming
//! audio files.

mod commands;

pub use commands::{Cli, Commands, TransformArgs, run_command};
