//! High-level image operations.
//!
//! These functions combine calculations with pixel work on `DynamicImage`s.
//! Resizing always uses the Lanczos3 filter.

use super::calculations::{
    calculate_crop_origin, calculate_fill_dimensions, calculate_fit_dimensions, fits_within,
};
use super::codec::supports_alpha;
use super::params::{CropAnchor, Size};
use crate::error::Result;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};

/// A pluggable image-to-image step (`preprocess` / `postprocess`).
pub trait Transform: Send + Sync {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage>;
}

/// Resize to `size`.
///
/// - Already fits within `(width, height)` → returned unchanged.
/// - `force` → scaled to cover the target, then cropped to exactly
///   `width × height` at `anchor`.
/// - otherwise → scaled down to fit, preserving aspect.
pub fn resize(image: &DynamicImage, size: Size, anchor: CropAnchor) -> DynamicImage {
    let source = (image.width(), image.height());
    let target = size.dimensions();

    if fits_within(source, target) {
        return image.clone();
    }

    if size.force {
        let (fill_w, fill_h) = calculate_fill_dimensions(source, target);
        let filled = image.resize_exact(fill_w, fill_h, FilterType::Lanczos3);
        let (x, y) = calculate_crop_origin((fill_w, fill_h), target, anchor);
        filled.crop_imm(x, y, target.0, target.1)
    } else {
        let (w, h) = calculate_fit_dimensions(source, target);
        image.resize_exact(w, h, FilterType::Lanczos3)
    }
}

/// Prepare the color mode for encoding as `format`.
///
/// Formats without alpha get the image flattened onto opaque white using the
/// alpha channel as the paste mask. Otherwise anything that is not already
/// RGB or RGBA becomes RGBA.
pub fn normalize(image: DynamicImage, format: ImageFormat) -> DynamicImage {
    if !supports_alpha(format) {
        return match image.color() {
            ColorType::Rgb8 => image,
            _ => DynamicImage::ImageRgb8(flatten_on_white(&image.to_rgba8())),
        };
    }
    match image.color() {
        ColorType::Rgb8 | ColorType::Rgba8 => image,
        _ => DynamicImage::ImageRgba8(image.to_rgba8()),
    }
}

/// Composite an RGBA image over an opaque white canvas.
pub fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, GrayImage, Luma, Rgba};

    fn solid(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 100, 50])))
    }

    #[test]
    fn resize_noop_when_fits() {
        let img = solid(100, 80);
        let out = resize(&img, Size::new(200, 200, true), CropAnchor::Middle);
        assert_eq!(out.dimensions(), (100, 80));
    }

    #[test]
    fn resize_fit_preserves_aspect() {
        let img = solid(1000, 600);
        let out = resize(&img, Size::new(300, 300, false), CropAnchor::Middle);
        assert_eq!(out.dimensions(), (300, 180));
    }

    #[test]
    fn resize_force_is_exact() {
        let img = solid(1000, 600);
        for anchor in [CropAnchor::Top, CropAnchor::Middle, CropAnchor::Bottom] {
            let out = resize(&img, Size::new(200, 200, true), anchor);
            assert_eq!(out.dimensions(), (200, 200));
        }
    }

    #[test]
    fn resize_force_crops_from_anchor() {
        // Top half black, bottom half white; a square crop from the top must
        // stay black.
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(100, 400, |_, y| {
            Luma([if y < 200 { 0 } else { 255 }])
        }));
        let top = resize(&img, Size::new(50, 50, true), CropAnchor::Top);
        assert_eq!(top.get_pixel(25, 10).0[0], 0);
        let bottom = resize(&img, Size::new(50, 50, true), CropAnchor::Bottom);
        assert_eq!(bottom.get_pixel(25, 40).0[0], 255);
    }

    #[test]
    fn normalize_flattens_for_jpeg() {
        let transparent = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0])));
        let out = normalize(transparent, ImageFormat::Jpeg);
        assert_eq!(out.color(), ColorType::Rgb8);
        assert_eq!(out.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn normalize_converts_grey_to_rgba_for_png() {
        let grey = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([9])));
        let out = normalize(grey, ImageFormat::Png);
        assert_eq!(out.color(), ColorType::Rgba8);
    }

    #[test]
    fn normalize_keeps_rgb_for_png() {
        let out = normalize(solid(2, 2), ImageFormat::Png);
        assert_eq!(out.color(), ColorType::Rgb8);
    }

    #[test]
    fn flatten_blends_half_alpha() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let flat = flatten_on_white(&img);
        // 255 * 127/255 ≈ 127
        assert_eq!(flat.get_pixel(0, 0).0, [127, 127, 127]);
    }
}
