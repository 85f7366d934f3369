//! Safe-replace: promote a validated temp file without losing the original.
//!
//! Preserve mode archives the original first, then moves the temp file to
//! its final name; if the second step fails the original is restored from
//! the archive. Replace mode drops the original only once the new file is
//! in place.
//!
//! The two moves are not atomic as a pair. A crash between them leaves the
//! original in the archive and the temp file beside it, both recoverable.

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::PreservedArchive;
use crate::config::ReplaceMode;
use crate::error::{Error, Result};

/// Move `temp` to `final_path`, disposing of `original` per `mode`.
///
/// Returns the archive location in preserve mode.
pub fn safe_replace(
    original: &Path,
    temp: &Path,
    final_path: &Path,
    mode: ReplaceMode,
    archive: &PreservedArchive,
) -> Result<Option<PathBuf>> {
    match mode {
        ReplaceMode::Preserve => preserve_and_promote(original, temp, final_path, archive).map(Some),
        ReplaceMode::Replace => replace_in_place(original, temp, final_path).map(|_| None),
    }
}

fn preserve_and_promote(
    original: &Path,
    temp: &Path,
    final_path: &Path,
    archive: &PreservedArchive,
) -> Result<PathBuf> {
    let backup = archive
        .preserve(original)
        .map_err(|e| Error::replace(original, format!("could not archive original: {}", e)))?;

    if let Err(e) = rename_over(temp, final_path) {
        tracing::error!(
            target: "transform",
            "Failed to move {:?} to {:?}: {}; restoring original",
            temp,
            final_path,
            e
        );
        restore_best_effort(original, archive);
        return Err(Error::replace(final_path, e.to_string()));
    }

    Ok(backup)
}

fn replace_in_place(original: &Path, temp: &Path, final_path: &Path) -> Result<()> {
    if final_path == original {
        return rename_over(temp, original).map_err(|e| Error::replace(original, e.to_string()));
    }

    rename_over(temp, final_path).map_err(|e| Error::replace(final_path, e.to_string()))?;

    if let Err(e) = fs::remove_file(original) {
        // Keep the original authoritative: undo the promotion
        tracing::error!(
            target: "transform",
            "Failed to remove original {:?}: {}; discarding {:?}",
            original,
            e,
            final_path
        );
        if let Err(cleanup) = fs::remove_file(final_path) {
            tracing::error!(target: "transform", "Failed to discard {:?}: {}", final_path, cleanup);
        }
        return Err(Error::replace(original, format!("could not remove original: {}", e)));
    }
    Ok(())
}

/// Restore `original` from the archive, logging instead of failing.
pub fn restore_best_effort(original: &Path, archive: &PreservedArchive) {
    if let Err(e) = archive.restore(original) {
        tracing::error!(
            target: "transform",
            "Could not restore {:?} from archive ({:?}): {}",
            original,
            archive.backup_path(original),
            e
        );
    }
}

/// Rename, replacing an existing destination.
fn rename_over(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        // Windows refuses to rename over an existing file
        Err(_) if to.exists() => {
            fs::remove_file(to)?;
            fs::rename(from, to)
        }
        Err(e) => Err(e),
    }
}
