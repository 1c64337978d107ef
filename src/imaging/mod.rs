//! Image processing: pure Rust, built on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `ImageReader::with_guessed_format` + `decode` |
//! | **Resize (fit)** | `resize_exact` with Lanczos3 to fit-within dimensions |
//! | **Resize (force)** | fill dimensions + `crop_imm` at the crop anchor |
//! | **Normalize** | alpha flattened on white for JPEG, RGBA otherwise |
//! | **Watermark** | scale / rotate / place / tile + manual alpha composite |
//! | **Encode** | `JpegEncoder::new_with_quality`, `write_to` for the rest |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and placement math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Codec**: Decoding uploads and encoding results
//! - **Operations**: Resize and color-mode normalization, plus the [`Transform`] seam
//! - **Watermark**: The [`Watermarker`] postprocess

pub mod calculations;
pub mod codec;
pub mod operations;
pub mod params;
pub mod watermark;

pub use codec::{DecodedImage, decode, encode};
pub use operations::{Transform, normalize, resize};
pub use params::{Coord, CropAnchor, Position, Quality, Rotation, Scale, Size};
pub use watermark::Watermarker;
