//! JSON output for command results.
//!
//! Notifications are written as JSON lines, one object per finished
//! request, so a consumer can stream them:
//!
//! ```json
//! {"path":"/photos/a.jpg","mime_type":"image/jpeg","key":{"hash":1234,"size":5678},"thumbnails":[[64,64],[48,48],[32,32],[16,16]]}
//! ```
//!
//! Stats are a single pretty-printed object.

use std::io::Write;

use serde::Serialize;

use crate::cache::{ContentKey, Finished, IconItem};

/// One finished content request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFinished {
    /// Requested path
    pub path: String,
    /// Detected mimetype
    pub mime_type: String,
    /// Content key, absent when the file was not hashed
    pub key: Option<ContentKey>,
    /// Thumbnail dimensions, largest first
    pub thumbnails: Vec<[u32; 2]>,
}

impl From<&Finished> for JsonFinished {
    fn from(finished: &Finished) -> Self {
        Self {
            path: finished.path.to_string_lossy().into_owned(),
            mime_type: finished.entry.mime_type.clone(),
            key: finished.key,
            thumbnails: finished
                .entry
                .thumbnail_sizes()
                .into_iter()
                .map(|(w, h)| [w, h])
                .collect(),
        }
    }
}

/// One fetched icon.
#[derive(Debug, Clone, Serialize)]
pub struct JsonIcon {
    /// Icon name
    pub name: String,
    /// Requested edge length
    pub scale: u32,
    /// Actual bitmap dimensions
    pub dimensions: [u32; 2],
}

impl From<&IconItem> for JsonIcon {
    fn from(item: &IconItem) -> Self {
        Self {
            name: item.key.name.clone(),
            scale: item.key.scale,
            dimensions: [item.image.width(), item.image.height()],
        }
    }
}

/// Size and entry count of one cache.
#[derive(Debug, Clone, Serialize)]
pub struct JsonCacheStats {
    /// Indexed entries
    pub entries: usize,
    /// Index file size in bytes
    pub index_bytes: u64,
    /// Data file size in bytes
    pub data_bytes: u64,
}

/// Output of the stats command.
#[derive(Debug, Clone, Serialize)]
pub struct JsonStats {
    /// Cache directory
    pub cache_dir: String,
    /// Content cache figures
    pub content: JsonCacheStats,
    /// Icon cache figures
    pub icons: JsonCacheStats,
}

/// Write `value` as one compact JSON line.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), JsonOutputError> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Write `value` as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_pretty<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), JsonOutputError> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON output: {0}")]
    Io(#[from] std::io::Error),
}
