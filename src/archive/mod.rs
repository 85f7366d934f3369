//! Preserved-original archive.
//!
//! Before a transform replaces a file, the original is moved into a backup
//! tree organized per library item:
//!
//! ```text
//! <root>/<itemFolderName>/<originalFileName>
//! ```
//!
//! where `itemFolderName` is the name of the directory holding the file.
//! Moves are renames when possible; across filesystems the file is copied,
//! verified byte-for-byte, and only then removed from its old location.

mod hash;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};

pub use hash::{compute_file_hash, files_identical};

/// Folder used for files that sit directly under a filesystem root.
const ROOT_ITEM_FOLDER: &str = "_root";

/// Backup tree of pre-transform originals.
#[derive(Debug, Clone)]
pub struct PreservedArchive {
    root: PathBuf,
}

impl PreservedArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `original` is (or would be) archived.
    pub fn backup_path(&self, original: &Path) -> PathBuf {
        let item_folder = original
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| ROOT_ITEM_FOLDER.into());
        let file_name = original
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        self.root.join(item_folder).join(file_name)
    }

    pub fn has_backup(&self, original: &Path) -> bool {
        self.backup_path(original).is_file()
    }

    /// Move `original` into the archive, replacing any stale backup.
    ///
    /// Idempotent: if the original is already gone but its backup exists,
    /// the existing backup is returned untouched.
    pub fn preserve(&self, original: &Path) -> Result<PathBuf> {
        let backup = self.backup_path(original);

        if !original.exists() {
            if backup.is_file() {
                tracing::debug!(target: "archive", "{:?} already preserved", original);
                return Ok(backup);
            }
            return Err(Error::not_found(original));
        }

        if let Some(parent) = backup.parent() {
            fs::create_dir_all(parent)
                .with_context(format!("Failed to create archive folder {:?}", parent))?;
        }
        if backup.exists() {
            tracing::debug!(target: "archive", "Replacing stale backup {:?}", backup);
            fs::remove_file(&backup)
                .with_context(format!("Failed to remove stale backup {:?}", backup))?;
        }

        move_file(original, &backup)?;
        tracing::info!(target: "archive", "Preserved {:?} -> {:?}", original, backup);
        Ok(backup)
    }

    /// Move the archived copy back to `original`.
    ///
    /// Does nothing if something already exists at `original`; the backup
    /// is kept in that case.
    pub fn restore(&self, original: &Path) -> Result<()> {
        let backup = self.backup_path(original);
        if original.exists() {
            tracing::debug!(target: "archive", "{:?} present, restore not needed", original);
            return Ok(());
        }
        if !backup.is_file() {
            return Err(Error::not_found(backup));
        }

        move_file(&backup, original)?;
        tracing::info!(target: "archive", "Restored {:?} from archive", original);
        Ok(())
    }
}

/// Rename, or copy + verify + delete when rename fails (cross-device).
///
/// The destination only appears under its final name once it holds a
/// verified copy.
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    let partial = partial_path(to);
    fs::copy(from, &partial).with_context(format!("Failed to copy {:?} to {:?}", from, partial))?;

    match files_identical(from, &partial) {
        Ok(true) => {}
        Ok(false) => {
            let _ = fs::remove_file(&partial);
            return Err(Error::replace(to, "copied file does not match original"));
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(Error::Io(e).context(format!("Failed to verify copy of {:?}", from)));
        }
    }

    fs::rename(&partial, to).with_context(format!("Failed to finalize {:?}", to))?;
    fs::remove_file(from).with_context(format!("Failed to remove {:?} after copy", from))?;
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TempLibrary;

    #[test]
    fn test_backup_path_uses_item_folder() {
        let archive = PreservedArchive::new("/backups");
        assert_eq!(
            archive.backup_path(Path::new("/music/game-42/theme.mp3")),
            PathBuf::from("/backups/game-42/theme.mp3")
        );
    }

    #[test]
    fn test_preserve_moves_original() {
        let library = TempLibrary::new();
        let song = library.add_file("item-1", "song.mp3", b"original bytes");
        let archive = library.archive();

        let backup = archive.preserve(&song).unwrap();

        assert!(!song.exists());
        assert_eq!(fs::read(&backup).unwrap(), b"original bytes");
        assert!(archive.has_backup(&song));
    }

    #[test]
    fn test_preserve_overwrites_stale_backup() {
        let library = TempLibrary::new();
        let archive = library.archive();
        let song = library.add_file("item-1", "song.mp3", b"new original");

        let stale = archive.backup_path(&song);
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"stale").unwrap();

        let backup = archive.preserve(&song).unwrap();
        assert_eq!(fs::read(&backup).unwrap(), b"new original");
    }

    #[test]
    fn test_preserve_is_idempotent() {
        let library = TempLibrary::new();
        let archive = library.archive();
        let song = library.add_file("item-1", "song.mp3", b"bytes");

        let first = archive.preserve(&song).unwrap();
        let second = archive.preserve(&song).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(&second).unwrap(), b"bytes");
    }

    #[test]
    fn test_preserve_missing_without_backup_fails() {
        let library = TempLibrary::new();
        let archive = library.archive();
        let ghost = library.music_dir().join("item-1").join("ghost.mp3");

        assert!(matches!(archive.preserve(&ghost), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_restore_round_trip() {
        let library = TempLibrary::new();
        let archive = library.archive();
        let song = library.add_file("item-1", "song.flac", b"lossless");

        archive.preserve(&song).unwrap();
        archive.restore(&song).unwrap();

        assert_eq!(fs::read(&song).unwrap(), b"lossless");
        assert!(!archive.has_backup(&song));
    }

    #[test]
    fn test_restore_keeps_existing_file() {
        let library = TempLibrary::new();
        let archive = library.archive();
        let song = library.add_file("item-1", "song.mp3", b"v1");

        archive.preserve(&song).unwrap();
        fs::write(&song, b"v2").unwrap();
        archive.restore(&song).unwrap();

        assert_eq!(fs::read(&song).unwrap(), b"v2");
        assert!(archive.has_backup(&song));
    }

    #[test]
    fn test_move_file_leaves_no_partial() {
        let library = TempLibrary::new();
        let from = library.add_file("a", "x.mp3", b"data");
        let to = library.music_dir().join("a").join("y.mp3");

        move_file(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"data");
        assert!(!partial_path(&to).exists());
    }
}
