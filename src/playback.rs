//! Playback collaborator.
//!
//! Transforms must not write a file the player has open. The player lives
//! outside this crate; it is reached through [`PlaybackControl`].

use std::path::{Path, PathBuf};

/// Current playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Loading,
    Playing,
    Paused,
}

impl PlaybackStatus {
    /// Loading and paused players still hold the file open.
    pub fn holds_file(&self) -> bool {
        !matches!(self, PlaybackStatus::Stopped)
    }
}

/// Control surface of the external audio player.
pub trait PlaybackControl: Send + Sync {
    fn status(&self) -> PlaybackStatus;

    /// File currently loaded, if the player reports one.
    fn current_track(&self) -> Option<PathBuf>;

    fn stop(&self);

    fn is_playing(&self) -> bool {
        self.status().holds_file()
    }
}

/// Used when no player is attached (CLI, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlayback;

impl PlaybackControl for NoPlayback {
    fn status(&self) -> PlaybackStatus {
        PlaybackStatus::Stopped
    }

    fn current_track(&self) -> Option<PathBuf> {
        None
    }

    fn stop(&self) {}
}

/// Stop the player if it may be holding `target`.
///
/// With no target, any active playback is stopped. A player that does not
/// report its track is stopped regardless. Returns whether stop was called.
pub fn stop_if_playing(control: &dyn PlaybackControl, target: Option<&Path>) -> bool {
    if !control.is_playing() {
        return false;
    }

    let holds_target = match (target, control.current_track()) {
        (Some(target), Some(current)) => current == target,
        _ => true,
    };
    if holds_target {
        tracing::info!(target: "transform", "Stopping playback before writing {:?}", target);
        control.stop();
    }
    holds_target
}
