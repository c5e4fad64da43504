//! Content hashing for cache keys.
//!
//! - [`murmur`]: the 32-bit MurmurHash2 checksum
//! - [`hasher`]: the hashing stage and its background loop

pub mod hasher;
pub mod murmur;

use std::io;
use std::path::{Path, PathBuf};

pub use hasher::{
    spawn_hashing_worker, HashOutcome, HashResult, Hasher, HashingWorker, DEFAULT_MAX_HASH_SIZE,
};
pub use murmur::{murmur2, HASH_SEED};

/// Errors that can occur while hashing a file.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised for `path`.
    pub(crate) fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}
