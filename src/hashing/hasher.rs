//! Content hashing stage.
//!
//! [`Hasher`] turns a path into a [`ContentKey`] by hashing the file with
//! MurmurHash2. Files larger than the configured cap are never read: they
//! have no key and are detected by extension only further down the pipeline.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::Sender;

use super::murmur::{murmur2, HASH_SEED};
use super::HashError;
use crate::cache::ContentKey;
use crate::worker::{Job, WorkerLoop};

/// Default cap on hashed content: 10 MiB.
pub const DEFAULT_MAX_HASH_SIZE: u64 = 10 * 1024 * 1024;

/// Outcome of hashing one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashResult {
    /// The requested path.
    pub path: PathBuf,
    /// Content key, or `None` for empty files and files over the cap.
    pub key: Option<ContentKey>,
}

/// What the hashing stage reports for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashOutcome {
    /// The file was inspected; the key may still be absent.
    Hashed(HashResult),
    /// The file could not be opened or read.
    Unreadable(PathBuf),
}

/// Computes content keys for files up to a size cap.
#[derive(Debug, Clone, Copy)]
pub struct Hasher {
    max_size: u64,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HASH_SIZE)
    }
}

impl Hasher {
    /// Create a hasher that refuses files larger than `max_size` bytes.
    #[must_use]
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }

    /// The size cap in bytes.
    #[must_use]
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Compute the content key of a file.
    ///
    /// Returns `Ok(None)` without reading any content when the file is empty
    /// or larger than the cap. A computed hash of zero is reported as one,
    /// keeping zero free as the "not hashed" marker.
    pub fn content_key(&self, path: &Path) -> Result<Option<ContentKey>, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let size = file.metadata().map_err(|e| HashError::from_io(path, e))?.len();
        if size == 0 || size > self.max_size {
            log::trace!("Not hashing {} ({} bytes)", path.display(), size);
            return Ok(None);
        }

        let mut content = Vec::with_capacity(size as usize);
        file.take(self.max_size)
            .read_to_end(&mut content)
            .map_err(|e| HashError::from_io(path, e))?;

        let hash = match murmur2(&content, HASH_SEED) {
            0 => 1,
            hash => hash,
        };
        Ok(Some(ContentKey::new(hash, size as i64)))
    }
}

impl Job for Hasher {
    type Input = PathBuf;
    type Output = HashOutcome;

    fn run(&mut self, path: PathBuf) -> Option<HashOutcome> {
        Some(match self.content_key(&path) {
            Ok(key) => HashOutcome::Hashed(HashResult { path, key }),
            Err(e) => {
                log::debug!("Skipping unhashable file: {}", e);
                HashOutcome::Unreadable(path)
            }
        })
    }
}

/// Background loop hashing queued paths, newest first.
pub type HashingWorker = WorkerLoop<Hasher>;

/// Start a hashing loop reporting to `results`.
pub fn spawn_hashing_worker(
    hasher: Hasher,
    results: Sender<HashOutcome>,
    idle_interval: Duration,
) -> io::Result<HashingWorker> {
    WorkerLoop::spawn("thumbcache-hasher", hasher, results, idle_interval)
}
