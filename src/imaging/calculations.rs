//! Pure calculation functions for image and watermark geometry.
//!
//! All functions here are pure and testable without any I/O or images. The
//! only exception to "pure" is randomness, which callers inject as an `Rng`.

use super::params::{Coord, CropAnchor, Position, Rotation, Scale};
use rand::Rng;

/// `"R"` watermark scale: this percentage of the fit scale.
pub const WATERMARK_PERCENTAGE: f64 = 30.0;

/// Distance kept from the edges for corner watermark positions.
pub const WATERMARK_MARGIN: i64 = 10;

/// Whether `source` already fits inside `bounds` (no resize needed).
pub fn fits_within(source: (u32, u32), bounds: (u32, u32)) -> bool {
    source.0 <= bounds.0 && source.1 <= bounds.1
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = ((h as f64 * src_aspect).round() as u32).max(tgt_w);
        (w, h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = ((w as f64 / src_aspect).round() as u32).max(tgt_h);
        (w, h)
    }
}

/// Largest dimensions with the source aspect ratio that fit inside `bounds`.
/// Never upscales, never returns a zero dimension.
pub fn calculate_fit_dimensions(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let ratio = (bounds.0 as f64 / src_w as f64)
        .min(bounds.1 as f64 / src_h as f64)
        .min(1.0);
    let w = ((src_w as f64 * ratio).round() as u32).clamp(1, bounds.0.max(1));
    let h = ((src_h as f64 * ratio).round() as u32).clamp(1, bounds.1.max(1));
    (w, h)
}

/// Top-left corner of the `target` crop inside a `filled` image.
///
/// The axis with excess is decided by comparing aspect ratios, the same way
/// [`calculate_fill_dimensions`] decides which side matches.
pub fn calculate_crop_origin(
    filled: (u32, u32),
    target: (u32, u32),
    anchor: CropAnchor,
) -> (u32, u32) {
    let excess_w = filled.0.saturating_sub(target.0);
    let excess_h = filled.1.saturating_sub(target.1);
    let offset = |excess: u32| match anchor {
        CropAnchor::Top => 0,
        CropAnchor::Middle => excess / 2,
        CropAnchor::Bottom => excess,
    };
    (offset(excess_w), offset(excess_h))
}

/// Pixel size of the watermark after applying `scale`.
///
/// A zero factor leaves the mark at its own size.
pub fn determine_scale(scale: Scale, target: (u32, u32), mark: (u32, u32)) -> (u32, u32) {
    let fit = || (target.0 as f64 / mark.0 as f64).min(target.1 as f64 / mark.1 as f64);
    let factor = match scale {
        Scale::Factor(f) if f == 0.0 => return mark,
        Scale::Factor(f) => f,
        Scale::Fit => fit(),
        Scale::Relative => fit() / 100.0 * WATERMARK_PERCENTAGE,
    };
    let w = (mark.0 as f64 * factor) as u32;
    let h = (mark.1 as f64 * factor) as u32;
    (w.max(1), h.max(1))
}

/// Top-left placement of a `mark` on `target`. May be negative for corner
/// positions when the mark is larger than the target.
pub fn determine_position(
    position: Position,
    target: (u32, u32),
    mark: (u32, u32),
    rng: &mut impl Rng,
) -> (i64, i64) {
    let max_left = (i64::from(target.0) - i64::from(mark.0)).max(0);
    let max_top = (i64::from(target.1) - i64::from(mark.1)).max(0);

    let axis = |coord: Coord, max: i64| match coord {
        Coord::Absolute(px) => px,
        Coord::Percent(frac) => (max as f64 * frac) as i64,
    };

    match position {
        Position::TopLeft => (WATERMARK_MARGIN, WATERMARK_MARGIN),
        Position::TopRight => (max_left - WATERMARK_MARGIN, WATERMARK_MARGIN),
        Position::BottomRight => (max_left - WATERMARK_MARGIN, max_top - WATERMARK_MARGIN),
        Position::BottomLeft => (WATERMARK_MARGIN, max_top - WATERMARK_MARGIN),
        Position::Center => (max_left / 2, max_top / 2),
        Position::Random => (rng.gen_range(0..=max_left), rng.gen_range(0..=max_top)),
        Position::At(x, y) => (axis(x, max_left), axis(y, max_top)),
    }
}

/// Degrees to rotate the mark counter-clockwise.
pub fn determine_rotation(rotation: Rotation, rng: &mut impl Rng) -> i32 {
    match rotation {
        Rotation::None => 0,
        Rotation::Degrees(deg) => deg,
        Rotation::Random => rng.gen_range(0..360),
    }
}

/// First tile origin on one axis: the placement wrapped back so that the
/// tile grid covers the target from its leading edge.
pub fn tile_origin(position: i64, tile: u32) -> i64 {
    let tile = i64::from(tile);
    position.rem_euclid(tile) - tile
}
