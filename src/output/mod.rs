//! Output formatting for command results.
//!
//! Text output is one tab-separated line per result; [`json`] holds the
//! machine-readable variants.

pub mod json;

use std::io::Write;

use bytesize::ByteSize;

use crate::cache::{Finished, IconItem};

pub use json::{JsonCacheStats, JsonFinished, JsonIcon, JsonOutputError, JsonStats};

/// `path<TAB>mimetype<TAB>sizes` for one finished request.
#[must_use]
pub fn finished_line(finished: &Finished) -> String {
    let sizes: Vec<String> = finished
        .entry
        .thumbnail_sizes()
        .iter()
        .map(|(w, h)| format!("{}x{}", w, h))
        .collect();
    format!(
        "{}\t{}\t{}",
        finished.path.display(),
        finished.entry.mime_type,
        if sizes.is_empty() {
            "-".to_string()
        } else {
            sizes.join(",")
        }
    )
}

/// `name<TAB>scale<TAB>WxH` for one fetched icon.
#[must_use]
pub fn icon_line(item: &IconItem) -> String {
    format!(
        "{}\t{}\t{}x{}",
        item.key.name,
        item.key.scale,
        item.image.width(),
        item.image.height()
    )
}

/// Human-readable stats report.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_stats<W: Write>(writer: &mut W, stats: &JsonStats) -> std::io::Result<()> {
    writeln!(writer, "Cache directory: {}", stats.cache_dir)?;
    for (label, cache) in [("Content", &stats.content), ("Icons", &stats.icons)] {
        writeln!(
            writer,
            "{:<8} {:>8} entries  index {:>10}  data {:>10}",
            label,
            cache.entries,
            ByteSize::b(cache.index_bytes).to_string(),
            ByteSize::b(cache.data_bytes).to_string()
        )?;
    }
    Ok(())
}
