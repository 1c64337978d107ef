//! Watermark compositing.
//!
//! Processing order for each target image:
//!
//! 1. Resolve pixel scale, rotation and placement from their specs.
//! 2. Scale the mark, multiply its alpha by `opacity`, optionally greyscale.
//! 3. Rotate on a canvas padded to 1.5× so the corners are not clipped.
//! 4. Paste once at the placement, or tile across the whole target starting
//!    from the wrapped placement.
//! 5. Alpha-composite the watermark layer over the target.

use super::calculations::{determine_position, determine_rotation, determine_scale, tile_origin};
use super::operations::Transform;
use super::params::{Position, Rotation, Scale};
use crate::error::{MediaError, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use rand::Rng;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Watermarker {
    mark: RgbaImage,
    position: Position,
    opacity: f32,
    tile: bool,
    scale: Scale,
    greyscale: bool,
    rotation: Rotation,
}

impl Watermarker {
    pub const DEFAULT_OPACITY: f32 = 0.5;

    pub fn new(mark: DynamicImage) -> Self {
        Self {
            mark: mark.to_rgba8(),
            position: Position::default(),
            opacity: Self::DEFAULT_OPACITY,
            tile: false,
            scale: Scale::default(),
            greyscale: false,
            rotation: Rotation::default(),
        }
    }

    /// Load the mark from an image file.
    pub fn open(path: &Path) -> Result<Self> {
        let mark = image::open(path).map_err(|e| {
            MediaError::invalid(format!("invalid watermark image {}: {e}", path.display()))
        })?;
        Ok(Self::new(mark))
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Fails unless `0.0 <= opacity <= 1.0`.
    pub fn with_opacity(mut self, opacity: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(MediaError::invalid(format!(
                "watermark opacity must be between 0 and 1, got {opacity}"
            )));
        }
        self.opacity = opacity;
        Ok(self)
    }

    pub fn with_tile(mut self, tile: bool) -> Self {
        self.tile = tile;
        self
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_greyscale(mut self, greyscale: bool) -> Self {
        self.greyscale = greyscale;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Watermark `target`, drawing any random choices from `rng`.
    pub fn process(&self, target: &DynamicImage, rng: &mut impl Rng) -> RgbaImage {
        let target = target.to_rgba8();
        let target_dims = target.dimensions();

        let (w, h) = determine_scale(self.scale, target_dims, self.mark.dimensions());
        let mut mark = if (w, h) == self.mark.dimensions() {
            self.mark.clone()
        } else {
            imageops::resize(&self.mark, w, h, FilterType::Lanczos3)
        };
        let degrees = determine_rotation(self.rotation, rng);
        let position = determine_position(self.position, target_dims, (w, h), rng);

        if self.opacity < 1.0 {
            reduce_opacity(&mut mark, self.opacity);
        }
        if self.greyscale {
            let grey = DynamicImage::ImageRgba8(mark).to_luma_alpha8();
            mark = DynamicImage::ImageLumaA8(grey).to_rgba8();
        }
        if degrees.rem_euclid(360) != 0 {
            mark = rotate_padded(&mark, degrees);
        }

        let mut layer = RgbaImage::new(target_dims.0, target_dims.1);
        if self.tile {
            let (mw, mh) = mark.dimensions();
            let mut y = tile_origin(position.1, mh);
            while y < i64::from(target_dims.1) {
                let mut x = tile_origin(position.0, mw);
                while x < i64::from(target_dims.0) {
                    imageops::replace(&mut layer, &mark, x, y);
                    x += i64::from(mw);
                }
                y += i64::from(mh);
            }
        } else {
            imageops::replace(&mut layer, &mark, position.0, position.1);
        }

        composite(&layer, &target)
    }
}

impl Transform for Watermarker {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage> {
        let marked = self.process(&image, &mut rand::thread_rng());
        tracing::debug!(
            width = marked.width(),
            height = marked.height(),
            "Applied watermark"
        );
        Ok(DynamicImage::ImageRgba8(marked))
    }
}

/// Multiply every alpha value by `opacity`.
pub fn reduce_opacity(image: &mut RgbaImage, opacity: f32) {
    for pixel in image.pixels_mut() {
        pixel.0[3] = (f32::from(pixel.0[3]) * opacity).round() as u8;
    }
}

/// Center `mark` on a transparent canvas 1.5× its size, then rotate the canvas
/// counter-clockwise by `degrees` around its center (nearest neighbour,
/// same canvas size, transparent fill).
pub fn rotate_padded(mark: &RgbaImage, degrees: i32) -> RgbaImage {
    let (mw, mh) = mark.dimensions();
    let cw = (f64::from(mw) * 1.5) as u32;
    let ch = (f64::from(mh) * 1.5) as u32;
    let mut canvas = RgbaImage::new(cw, ch);
    imageops::replace(
        &mut canvas,
        mark,
        i64::from((cw - mw) / 2),
        i64::from((ch - mh) / 2),
    );

    let theta = f64::from(degrees).to_radians();
    let (sin, cos) = theta.sin_cos();
    let cx = f64::from(cw) / 2.0;
    let cy = f64::from(ch) / 2.0;

    RgbaImage::from_fn(cw, ch, |x, y| {
        let dx = f64::from(x) + 0.5 - cx;
        let dy = f64::from(y) + 0.5 - cy;
        // Inverse of a visual counter-clockwise rotation in y-down coordinates.
        let sx = dx * cos - dy * sin + cx;
        let sy = dx * sin + dy * cos + cy;
        if sx < 0.0 || sy < 0.0 {
            return Rgba([0, 0, 0, 0]);
        }
        let (sx, sy) = (sx as u32, sy as u32);
        if sx < cw && sy < ch {
            *canvas.get_pixel(sx, sy)
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// Blend `layer` over `target` using the layer's alpha as the mask. Color
/// channels mix linearly; the result alpha is the usual "over" coverage, so
/// an opaque target stays opaque.
pub fn composite(layer: &RgbaImage, target: &RgbaImage) -> RgbaImage {
    RgbaImage::from_fn(target.width(), target.height(), |x, y| {
        let top = layer.get_pixel(x, y).0;
        let bottom = target.get_pixel(x, y).0;
        let mask = u32::from(top[3]);
        let mix = |t: u32, b: u8| ((t * mask + u32::from(b) * (255 - mask) + 127) / 255) as u8;
        Rgba([
            mix(u32::from(top[0]), bottom[0]),
            mix(u32::from(top[1]), bottom[1]),
            mix(u32::from(top[2]), bottom[2]),
            mix(255, bottom[3]),
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn white(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
    }

    fn red_mark(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255])))
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn opaque_mark_at_center() {
        let marker = Watermarker::new(red_mark(10, 10))
            .with_position(Position::Center)
            .with_opacity(1.0)
            .unwrap();
        let out = marker.process(&white(100, 80), &mut rng());
        assert_eq!(out.dimensions(), (100, 80));
        // mark occupies 45..55 x 35..45
        assert_eq!(out.get_pixel(50, 40).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(44, 40).0, [255, 255, 255, 255]);
        assert_eq!(out.get_pixel(55, 40).0, [255, 255, 255, 255]);
    }

    #[test]
    fn half_opacity_blends() {
        let marker = Watermarker::new(red_mark(10, 10)).with_position(Position::TopLeft);
        let out = marker.process(&white(50, 50), &mut rng());
        let [r, g, b, a] = out.get_pixel(15, 15).0;
        assert_eq!(r, 255);
        assert!((126..=129).contains(&g), "g = {g}");
        assert_eq!(g, b);
        assert_eq!(a, 255);
    }

    #[test]
    fn fit_scale_covers_target_width() {
        let marker = Watermarker::new(red_mark(10, 5))
            .with_scale(Scale::Fit)
            .with_position(Position::Center)
            .with_opacity(1.0)
            .unwrap();
        let out = marker.process(&white(100, 100), &mut rng());
        // 10x5 scaled by 10 → 100x50, centered vertically at 25..75
        assert_eq!(out.get_pixel(0, 50).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(99, 30).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(50, 10).0, [255, 255, 255, 255]);
    }

    #[test]
    fn tile_covers_whole_target() {
        let marker = Watermarker::new(red_mark(7, 7))
            .with_tile(true)
            .with_position(Position::At(
                crate::imaging::params::Coord::Absolute(3),
                crate::imaging::params::Coord::Absolute(5),
            ))
            .with_opacity(1.0)
            .unwrap();
        let out = marker.process(&white(30, 20), &mut rng());
        assert!(out.pixels().all(|p| p.0 == [255, 0, 0, 255]));
    }

    #[test]
    fn greyscale_mark_has_equal_channels() {
        let marker = Watermarker::new(red_mark(10, 10))
            .with_greyscale(true)
            .with_position(Position::TopLeft)
            .with_opacity(1.0)
            .unwrap();
        let out = marker.process(&white(40, 40), &mut rng());
        let [r, g, b, _] = out.get_pixel(12, 12).0;
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert!(r < 255);
    }

    #[test]
    fn rotation_pads_canvas() {
        let rotated = rotate_padded(&red_mark(10, 20).to_rgba8(), 90);
        assert_eq!(rotated.dimensions(), (15, 30));
        // center stays covered
        assert_eq!(rotated.get_pixel(7, 15).0[3], 255);
        // 90° turns the 10x20 mark into roughly 20x10: top rows now transparent
        assert_eq!(rotated.get_pixel(7, 1).0[3], 0);
    }

    #[test]
    fn rejects_out_of_range_opacity() {
        assert!(Watermarker::new(red_mark(1, 1)).with_opacity(1.5).is_err());
        assert!(Watermarker::new(red_mark(1, 1)).with_opacity(-0.1).is_err());
    }

    #[test]
    fn transform_returns_rgba() {
        let marker = Watermarker::new(red_mark(4, 4));
        let out = marker.apply(white(20, 20)).unwrap();
        assert_eq!(out.dimensions(), (20, 20));
        assert!(out.color().has_alpha());
    }
}
