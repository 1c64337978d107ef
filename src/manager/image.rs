//! Image strategy: every upload is decoded and re-encoded.
//!
//! Pipeline for one save:
//!
//! 1. Decode (bytes, stream, or an in-memory image); failures are
//!    `InvalidArgument`.
//! 2. Resolve the filename, run `preprocess`.
//! 3. Resize to the per-call `size` or the configured `max_size`.
//! 4. Pick the output format: the native one if it is in `keep_formats`,
//!    otherwise JPEG with the extension rewritten to `.jpg`.
//! 5. Generate a unique name (on by default), then run the allow-list and
//!    existence checks.
//! 6. Store the thumbnail companion, resized from the pre-postprocess image.
//! 7. Run `postprocess` on the main image, normalize the color mode, encode,
//!    store.

use super::{
    Asset, AssetBody, AssetSink, Manager, SaveOptions, SaveStrategy, resolve_filename,
};
use crate::error::{MediaError, Result};
use crate::extensions::{self, AllowedExtensions};
use crate::imaging::{
    CropAnchor, DecodedImage, Quality, Size, Transform, codec, normalize, resize,
};
use crate::naming::{self, NameGenerator};
use crate::storage::{Payload, StorageBackend};
use image::ImageFormat;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_THUMBNAIL_SIZE: Size = Size::new(200, 200, true);
pub const DEFAULT_KEEP_FORMATS: &[&str] = &["PNG", "JPG", "JPEG"];

#[derive(Clone)]
pub struct ImageStrategy {
    max_size: Option<Size>,
    thumbnail_size: Option<Size>,
    keep_formats: Vec<String>,
    quality: Quality,
    crop: CropAnchor,
    preprocess: Option<Arc<dyn Transform>>,
    postprocess: Option<Arc<dyn Transform>>,
}

impl Default for ImageStrategy {
    fn default() -> Self {
        Self {
            max_size: None,
            thumbnail_size: Some(DEFAULT_THUMBNAIL_SIZE),
            keep_formats: DEFAULT_KEEP_FORMATS.iter().map(|s| s.to_string()).collect(),
            quality: Quality::default(),
            crop: CropAnchor::default(),
            preprocess: None,
            postprocess: None,
        }
    }
}

impl std::fmt::Debug for ImageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageStrategy")
            .field("max_size", &self.max_size)
            .field("thumbnail_size", &self.thumbnail_size)
            .field("keep_formats", &self.keep_formats)
            .field("quality", &self.quality)
            .field("crop", &self.crop)
            .field("preprocess", &self.preprocess.is_some())
            .field("postprocess", &self.postprocess.is_some())
            .finish()
    }
}

impl ImageStrategy {
    pub fn with_max_size(mut self, size: Option<Size>) -> Self {
        self.max_size = size;
        self
    }

    /// `None` disables thumbnails.
    pub fn with_thumbnail_size(mut self, size: Option<Size>) -> Self {
        self.thumbnail_size = size;
        self
    }

    pub fn with_keep_formats(mut self, formats: Vec<String>) -> Self {
        self.keep_formats = formats;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_crop(mut self, crop: CropAnchor) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_preprocess(mut self, transform: Option<Arc<dyn Transform>>) -> Self {
        self.preprocess = transform;
        self
    }

    pub fn with_postprocess(mut self, transform: Option<Arc<dyn Transform>>) -> Self {
        self.postprocess = transform;
        self
    }

    /// Output format and filename for an image decoded as `native`.
    fn save_format(&self, filename: String, native: Option<ImageFormat>) -> (String, ImageFormat) {
        match native.filter(|f| codec::format_in(*f, &self.keep_formats)) {
            Some(format) => (filename, format),
            None => (naming::replace_extension(&filename, "jpg"), ImageFormat::Jpeg),
        }
    }
}

impl SaveStrategy for ImageStrategy {
    fn kind(&self) -> &'static str {
        "image"
    }

    fn save(
        &self,
        sink: &AssetSink<'_>,
        asset: Asset,
        name: Option<&str>,
        options: &SaveOptions,
    ) -> Result<String> {
        for (what, size) in [("size", options.size), ("thumbnail_size", options.thumbnail_size)] {
            if size.is_some_and(Size::is_empty) {
                return Err(MediaError::invalid(format!("{what} values must be non-zero")));
            }
        }

        let decoded = match asset.body {
            AssetBody::Bytes(bytes) => codec::decode(&bytes)?,
            AssetBody::Reader(mut reader) => {
                let mut bytes = Vec::new();
                reader
                    .read_to_end(&mut bytes)
                    .map_err(|e| MediaError::backend("reading upload", e))?;
                codec::decode(&bytes)?
            }
            AssetBody::Image(decoded) => decoded,
        };
        let filename = resolve_filename(name, asset.filename.as_deref())?;

        let DecodedImage { mut image, format } = decoded;
        if let Some(pre) = &self.preprocess {
            image = pre.apply(image)?;
        }
        if let Some(size) = options.size.or(self.max_size) {
            image = resize(&image, size, self.crop);
        }

        let (mut filename, format) = self.save_format(filename, format);
        if options.generate_name.unwrap_or(true) {
            filename = sink.namegen.generate_name(&filename);
        }
        sink.check(&filename)?;

        let quality = options.quality.unwrap_or(self.quality);
        let thumbnail_size = options.thumbnail_size.or(self.thumbnail_size);
        if let Some(size) = thumbnail_size.filter(|_| options.create_thumbnail) {
            let thumb = normalize(resize(&image, size, self.crop), format);
            let bytes = codec::encode(&thumb, format, quality)?;
            let thumb_name = sink.namegen.thumbnail_name(&filename);
            sink.store_companion(&bytes, &thumb_name)?;
            debug!(name = %thumb_name, width = thumb.width(), height = thumb.height(), "Stored thumbnail");
        }

        if let Some(post) = options.postprocess.as_ref().or(self.postprocess.as_ref()) {
            image = post.apply(image)?;
        }
        let image = normalize(image, format);
        let bytes = codec::encode(&image, format, quality)?;
        sink.store_checked(Payload::Bytes(bytes), &filename)
    }

    fn companions(&self, namegen: &dyn NameGenerator, name: &str) -> Vec<String> {
        vec![namegen.thumbnail_name(name)]
    }

    fn has_thumbnails(&self) -> bool {
        true
    }
}

impl Manager {
    /// An image manager accepting the `IMAGES` extension group.
    pub fn image(
        name: impl Into<String>,
        storage: Box<dyn StorageBackend>,
        strategy: ImageStrategy,
    ) -> Self {
        Self::new(name, storage, Box::new(strategy))
            .with_extensions(AllowedExtensions::from_entries(extensions::IMAGES))
    }
}
