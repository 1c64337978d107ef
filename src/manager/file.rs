//! Plain file strategy: bytes are stored exactly as uploaded.

use super::{Asset, AssetBody, AssetSink, SaveOptions, SaveStrategy, resolve_filename};
use crate::error::Result;
use crate::imaging::codec;
use crate::storage::Payload;
use image::ImageFormat;

#[derive(Debug, Clone, Copy, Default)]
pub struct FileStrategy;

impl SaveStrategy for FileStrategy {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn save(
        &self,
        sink: &AssetSink<'_>,
        asset: Asset,
        name: Option<&str>,
        options: &SaveOptions,
    ) -> Result<String> {
        let mut filename = resolve_filename(name, asset.filename.as_deref())?;
        if options.generate_name.unwrap_or(false) {
            filename = sink.namegen.generate_name(&filename);
        }

        let payload = match asset.body {
            AssetBody::Bytes(bytes) => Payload::Bytes(bytes),
            AssetBody::Reader(reader) => Payload::Reader(reader),
            AssetBody::Image(decoded) => {
                // In-memory images have no container; PNG keeps every pixel.
                let format = decoded.format.unwrap_or(ImageFormat::Png);
                let quality = options.quality.unwrap_or_default();
                Payload::Bytes(codec::encode(&decoded.image, format, quality)?)
            }
        };
        sink.store(payload, &filename)
    }
}
