//! Icons embedded in platform executables.
//!
//! Extraction itself is platform specific and lives behind
//! [`ExecutableIconExtractor`]. This module only owns the trait, the no-op
//! default, and the jumbo-icon transparency check.

use std::path::Path;

use image::RgbaImage;

/// Share of sampled pixels that must be fully transparent to reject a jumbo icon.
const TRANSPARENT_THRESHOLD: f64 = 0.95;

/// Sample every n-th pixel of the inspected quadrant in each direction.
const SAMPLE_STEP: usize = 4;

/// Source of icons embedded in executables.
pub trait ExecutableIconExtractor: Send {
    /// The regular-size icon of `path`.
    fn icon(&self, path: &Path) -> Option<RgbaImage>;

    /// The largest ("jumbo") icon variant of `path`.
    fn jumbo_icon(&self, _path: &Path) -> Option<RgbaImage> {
        None
    }
}

/// Extractor for platforms without embedded executable icons.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExecutableIcons;

impl ExecutableIconExtractor for NoExecutableIcons {
    fn icon(&self, _path: &Path) -> Option<RgbaImage> {
        None
    }
}

/// Whether an icon is mostly transparent.
///
/// Executables without a real jumbo icon get their small icon padded into
/// the top-left corner of the jumbo canvas, so the bottom-right quadrant is
/// sampled: if nearly all of it has zero alpha the variant is useless.
#[must_use]
pub fn is_mostly_transparent(image: &RgbaImage) -> bool {
    let (width, height) = image.dimensions();
    if width < 2 || height < 2 {
        return true;
    }

    let mut sampled = 0usize;
    let mut transparent = 0usize;
    for y in (height / 2..height).step_by(SAMPLE_STEP) {
        for x in (width / 2..width).step_by(SAMPLE_STEP) {
            sampled += 1;
            if image.get_pixel(x, y)[3] == 0 {
                transparent += 1;
            }
        }
    }

    transparent as f64 / sampled as f64 >= TRANSPARENT_THRESHOLD
}
