//! Content hashing for archive copy verification.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Compute the SHA-256 of a whole file.
///
/// # Returns
///
/// SHA256 hash as a lowercase hex string (64 characters)
///
/// # Errors
///
/// Returns an IO error if the file cannot be read.
pub fn compute_file_hash(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// True if both files have the same length and content.
pub fn files_identical(a: &Path, b: &Path) -> std::io::Result<bool> {
    if std::fs::metadata(a)?.len() != std::fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(compute_file_hash(a)? == compute_file_hash(b)?)
}
