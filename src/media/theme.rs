//! Icon theme lookup.
//!
//! [`IconResolver`] is what the icon cache consults on a miss.
//! [`DirectoryIconTheme`] resolves icons from freedesktop-style theme
//! directories:
//!
//! ```text
//! <search path>/<theme>/<N>x<N>/<context>/<name>.png
//! ```
//!
//! The configured theme is tried first, then the fallback theme. Within a
//! theme the exact size wins, then the nearest larger size, then the nearest
//! smaller one; the result is always scaled to the requested edge length.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use walkdir::WalkDir;

/// Resolves icon names to bitmaps.
pub trait IconResolver: Send + Sync {
    /// The icon `name` at `scale` x `scale` pixels.
    fn resolve(&self, name: &str, scale: u32) -> Option<RgbaImage>;

    /// Every icon name the theme provides.
    fn icon_names(&self) -> Vec<String>;
}

/// Standard icon directories of the platform.
#[must_use]
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        paths.push(base.data_dir().join("icons"));
    }
    let data_dirs = env::var("XDG_DATA_DIRS").unwrap_or_else(|_| "/usr/local/share:/usr/share".to_string());
    for dir in data_dirs.split(':').filter(|d| !d.is_empty()) {
        let path = Path::new(dir).join("icons");
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

/// An icon theme laid out in directories.
#[derive(Debug, Clone)]
pub struct DirectoryIconTheme {
    search_paths: Vec<PathBuf>,
    themes: Vec<String>,
}

impl DirectoryIconTheme {
    /// Create a resolver for `theme`, falling back to `fallback`.
    #[must_use]
    pub fn new(search_paths: Vec<PathBuf>, theme: &str, fallback: &str) -> Self {
        let mut themes = vec![theme.to_string()];
        if fallback != theme && !fallback.is_empty() {
            themes.push(fallback.to_string());
        }
        Self {
            search_paths,
            themes,
        }
    }

    /// Theme directories that exist, in lookup order.
    fn theme_dirs(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.themes.iter().flat_map(move |theme| {
            self.search_paths
                .iter()
                .map(move |root| root.join(theme))
                .filter(|dir| dir.is_dir())
        })
    }

    /// Size directories of one theme, best match for `scale` first.
    fn size_dirs(theme_dir: &Path, scale: u32) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(theme_dir) else {
            return Vec::new();
        };
        let mut sized: Vec<(u32, PathBuf)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let size = parse_size_dir(&entry.file_name().to_string_lossy())?;
                Some((size, entry.path()))
            })
            .collect();

        // exact, then larger ascending, then smaller descending
        sized.sort_by_key(|(size, _)| {
            if *size >= scale {
                (0, size - scale)
            } else {
                (1, scale - size)
            }
        });
        sized.into_iter().map(|(_, path)| path).collect()
    }

    fn find_file(size_dir: &Path, file_name: &str) -> Option<PathBuf> {
        WalkDir::new(size_dir)
            .max_depth(2)
            .into_iter()
            .filter_map(Result::ok)
            .find(|entry| entry.file_type().is_file() && entry.file_name() == file_name)
            .map(|entry| entry.into_path())
    }
}

impl IconResolver for DirectoryIconTheme {
    fn resolve(&self, name: &str, scale: u32) -> Option<RgbaImage> {
        let file_name = format!("{}.png", name);
        for theme_dir in self.theme_dirs() {
            for size_dir in Self::size_dirs(&theme_dir, scale) {
                let Some(path) = Self::find_file(&size_dir, &file_name) else {
                    continue;
                };
                match image::open(&path) {
                    Ok(img) => {
                        let img = img.to_rgba8();
                        if img.dimensions() == (scale, scale) {
                            return Some(img);
                        }
                        return Some(imageops::resize(&img, scale, scale, FilterType::CatmullRom));
                    }
                    Err(e) => log::debug!("Unreadable icon {}: {}", path.display(), e),
                }
            }
        }
        None
    }

    fn icon_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for theme_dir in self.theme_dirs() {
            for entry in WalkDir::new(&theme_dir).into_iter().filter_map(Result::ok) {
                let path = entry.path();
                if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "png") {
                    if let Some(stem) = path.file_stem() {
                        names.insert(stem.to_string_lossy().into_owned());
                    }
                }
            }
        }
        names.into_iter().collect()
    }
}

/// Parse a `NxN` size directory name.
fn parse_size_dir(name: &str) -> Option<u32> {
    let (w, h) = name.split_once('x')?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    (w == h && w > 0).then_some(w)
}
