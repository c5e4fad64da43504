//! Append-only on-disk caches.
//!
//! Two caches share the same storage discipline: an index file mapping a
//! key to a byte offset, and a data file holding the serialized payloads at
//! those offsets. Both files only ever grow; the index starts with a one
//! byte format version and is replayed into memory when the cache opens.
//!
//! * [`content`]: thumbnails and mimetypes keyed by [`ContentKey`], fed by
//!   the hashing and extraction stages.
//! * [`icon`]: theme icons keyed by [`IconKey`], fed by its own fetch loop.
//! * [`entry`]: the record types both caches persist.
//!
//! # Validity
//!
//! Construction never fails. If the directory cannot be created, a file
//! cannot be opened or the index carries another format version, the cache
//! is permanently invalid: [`ContentCache::is_valid`] reports `false` and
//! every operation becomes a no-op.

pub mod content;
pub mod entry;
mod files;
pub mod icon;

use std::path::PathBuf;
use std::time::Duration;

use crate::hashing::DEFAULT_MAX_HASH_SIZE;
use crate::stream::StreamError;
use crate::worker::DEFAULT_IDLE_INTERVAL;

pub use content::{ContentCache, ContentStore, Finished, CONTENT_CACHE_VERSION};
pub use entry::{
    ContentKey, DataEntry, IconItem, IconKey, IndexEntry, WorkItem, ICON_SCALES, INDEX_ENTRY_LEN,
};
pub use icon::{IconCache, IconEvent, IconStore, ICON_CACHE_VERSION};

/// Runtime settings shared by both caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Files larger than this are never hashed or sniffed.
    pub max_hash_size: u64,
    /// Sleep of a background loop with nothing to do.
    pub idle_interval: Duration,
    /// Keep jumbo executable icons that are not mostly transparent.
    pub jumbo_icons: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_hash_size: DEFAULT_MAX_HASH_SIZE,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            jumbo_icons: true,
        }
    }
}

/// Errors raised while opening or using cache files.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The cache directory could not be created.
    #[error("Cannot create cache directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The index was written by another format version.
    #[error("Cache version mismatch: found {found}, expected {expected}")]
    VersionMismatch {
        /// Version byte found in the index file
        found: u8,
        /// Version this build writes
        expected: u8,
    },

    /// The index ends in the middle of a record.
    #[error("Index file {0} ends with a partial record")]
    Truncated(PathBuf),

    /// A stream operation failed.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
