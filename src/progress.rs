//! Progress reporting for the `process` and `icons` commands.
//!
//! [`Progress`] counts finished notifications against the number of
//! requests with an indicatif bar. It stays silent in quiet mode and when
//! results are printed as JSON.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

/// Receives progress updates while waiting for cache notifications.
pub trait ProgressCallback: Send + Sync {
    /// Waiting starts for `total` requests.
    fn on_start(&self, total: usize);

    /// One request finished.
    fn on_item(&self, path: &str);

    /// Waiting ended with `done` requests served.
    fn on_finish(&self, done: usize);
}

/// Progress reporter using indicatif.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    label: &'static str,
    quiet: bool,
}

impl Progress {
    /// Create a reporter; `quiet` disables all output.
    ///
    /// ```
    /// use thumbcache::progress::Progress;
    ///
    /// let progress = Progress::new("Caching", false);
    /// ```
    #[must_use]
    pub fn new(label: &'static str, quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            label,
            quiet,
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = guard.as_ref() {
            f(bar);
        }
    }
}

impl ProgressCallback for Progress {
    fn on_start(&self, total: usize) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(Self::style());
        bar.set_message(self.label);
        *self.bar.lock().unwrap_or_else(|e| e.into_inner()) = Some(bar);
    }

    fn on_item(&self, path: &str) {
        self.with_bar(|bar| {
            bar.inc(1);
            bar.set_message(truncate_path(path, 30));
        });
    }

    fn on_finish(&self, done: usize) {
        let bar = self.bar.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(bar) = bar {
            bar.finish_with_message(format!("{} complete ({} done)", self.label, done));
        }
    }
}

/// Shorten a path to its file name when it does not fit.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.len() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if file_name.len() >= max_len {
        let tail: String = file_name
            .chars()
            .rev()
            .take(max_len.saturating_sub(3))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        return format!("...{}", tail);
    }

    format!(".../{}", file_name)
}
