//! Decoding uploads and encoding results with the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff format | `ImageReader::with_guessed_format` |
//! | Decode | `ImageReader::decode` |
//! | Encode JPEG | `JpegEncoder::new_with_quality` on RGB8 |
//! | Encode other | `DynamicImage::write_to` |
//!
//! Format names used in configuration (`keep_image_formats`) are upper-case
//! extensions: `PNG`, `JPG`/`JPEG`, `GIF`, `WEBP`, `TIFF`, `BMP`.

use super::params::Quality;
use crate::error::{MediaError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

/// An image together with the container format it was decoded from.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    /// `None` for images built in memory rather than decoded.
    pub format: Option<ImageFormat>,
}

impl DecodedImage {
    pub fn new(image: DynamicImage, format: Option<ImageFormat>) -> Self {
        Self { image, format }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

impl From<DynamicImage> for DecodedImage {
    fn from(image: DynamicImage) -> Self {
        Self::new(image, None)
    }
}

/// Decode bytes, sniffing the format from the content.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| MediaError::invalid(format!("invalid image: {e}")))?;
    let format = reader
        .format()
        .ok_or_else(|| MediaError::invalid("invalid image: unrecognised format"))?;
    let image = reader
        .decode()
        .map_err(|e| MediaError::invalid(format!("invalid image: {e}")))?;
    Ok(DecodedImage::new(image, Some(format)))
}

/// Encode `image` as `format`. JPEG uses `quality`; lossless formats ignore it.
pub fn encode(image: &DynamicImage, format: ImageFormat, quality: Quality) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality.value())
                .encode_image(&rgb)
                .map_err(|e| MediaError::backend("encoding JPEG", e))?;
        }
        other => {
            image
                .write_to(&mut Cursor::new(&mut buf), other)
                .map_err(|e| MediaError::backend(format!("encoding {}", format_name(other)), e))?;
        }
    }
    Ok(buf)
}

/// Upper-case name of a format as written in configuration.
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "PNG",
        ImageFormat::Jpeg => "JPEG",
        ImageFormat::Gif => "GIF",
        ImageFormat::WebP => "WEBP",
        ImageFormat::Tiff => "TIFF",
        ImageFormat::Bmp => "BMP",
        ImageFormat::Ico => "ICO",
        _ => "UNKNOWN",
    }
}

/// Whether `format` is one of the configured names. `JPG` and `JPEG` both
/// match JPEG.
pub fn format_in(format: ImageFormat, names: &[String]) -> bool {
    names.iter().any(|name| {
        ImageFormat::from_extension(name.to_ascii_lowercase()).is_some_and(|f| f == format)
    })
}

/// Formats whose encoders keep an alpha channel.
pub fn supports_alpha(format: ImageFormat) -> bool {
    !matches!(format, ImageFormat::Jpeg | ImageFormat::Bmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn png_round_trip_reports_format() {
        let bytes = encode(&gradient(40, 30), ImageFormat::Png, Quality::default()).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.format, Some(ImageFormat::Png));
        assert_eq!(decoded.dimensions(), (40, 30));
        assert_eq!(decoded.image.get_pixel(5, 7), Rgba([5, 7, 128, 255]));
    }

    #[test]
    fn jpeg_encode_drops_alpha() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 128])));
        let bytes = encode(&rgba, ImageFormat::Jpeg, Quality::new(80)).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.format, Some(ImageFormat::Jpeg));
        assert!(!decoded.image.color().has_alpha());
    }

    #[test]
    fn garbage_is_invalid_argument() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, MediaError::InvalidArgument(ref m) if m.contains("invalid image")));
    }

    #[test]
    fn truncated_png_is_invalid_argument() {
        let bytes = encode(&gradient(20, 20), ImageFormat::Png, Quality::default()).unwrap();
        let err = decode(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, MediaError::InvalidArgument(_)));
    }

    #[test]
    fn format_names_match_aliases() {
        let keep = vec!["PNG".to_string(), "JPG".to_string()];
        assert!(format_in(ImageFormat::Png, &keep));
        assert!(format_in(ImageFormat::Jpeg, &keep));
        assert!(!format_in(ImageFormat::Gif, &keep));
        assert_eq!(format_name(ImageFormat::WebP), "WEBP");
    }
}
