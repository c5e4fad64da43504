//! Square thumbnail generation.
//!
//! The source is center-cropped to a square and scaled to the largest
//! thumbnail size once. Every smaller size is derived from the previous
//! level, never from the source, which keeps large photos cheap.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbaImage};

/// Thumbnail edge lengths, largest first.
pub const THUMBNAIL_SCALES: [u32; 4] = [64, 48, 32, 16];

/// Crop the largest centered square out of `image`.
#[must_use]
pub fn square_crop(image: &DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    image.crop_imm((width - side) / 2, (height - side) / 2, side, side)
}

/// Render the thumbnail chain for `image`, one per [`THUMBNAIL_SCALES`] entry.
///
/// An image without pixels yields no thumbnails.
#[must_use]
pub fn thumbnail_chain(image: &DynamicImage) -> Vec<RgbaImage> {
    if image.width() == 0 || image.height() == 0 {
        return Vec::new();
    }

    let square = square_crop(image).to_rgba8();
    let mut chain: Vec<RgbaImage> = Vec::with_capacity(THUMBNAIL_SCALES.len());
    for &scale in &THUMBNAIL_SCALES {
        let next = match chain.last() {
            Some(previous) => imageops::resize(previous, scale, scale, FilterType::Triangle),
            None => imageops::resize(&square, scale, scale, FilterType::CatmullRom),
        };
        chain.push(next);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// 200x100: red 50px bands left and right, blue 100x100 square between.
    fn banded() -> DynamicImage {
        let img = RgbaImage::from_fn(200, 100, |x, _| {
            if (50..150).contains(&x) {
                BLUE
            } else {
                RED
            }
        });
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_square_crop_is_centered() {
        let cropped = square_crop(&banded());
        assert_eq!(cropped.dimensions(), (100, 100));
        let rgba = cropped.to_rgba8();
        assert!(rgba.pixels().all(|p| *p == BLUE));
    }

    #[test]
    fn test_square_crop_portrait() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(30, 90));
        assert_eq!(square_crop(&img).dimensions(), (30, 30));
    }

    #[test]
    fn test_chain_sizes_descend() {
        let chain = thumbnail_chain(&banded());
        let sizes: Vec<(u32, u32)> = chain.iter().map(|t| t.dimensions()).collect();
        assert_eq!(sizes, vec![(64, 64), (48, 48), (32, 32), (16, 16)]);
    }

    #[test]
    fn test_chain_keeps_only_the_center() {
        for thumb in thumbnail_chain(&banded()) {
            let (w, h) = thumb.dimensions();
            let center = thumb.get_pixel(w / 2, h / 2);
            assert!(center[2] > 200, "center should stay blue: {:?}", center);
            assert!(center[0] < 50, "red bands should be cropped away: {:?}", center);
        }
    }

    #[test]
    fn test_small_source_is_scaled_up() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, RED));
        let chain = thumbnail_chain(&img);
        assert_eq!(chain[0].dimensions(), (64, 64));
    }

    #[test]
    fn test_empty_image_has_no_thumbnails() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(0, 0));
        assert!(thumbnail_chain(&img).is_empty());
    }
}
