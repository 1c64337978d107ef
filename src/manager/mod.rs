//! Managers: named asset namespaces on top of a storage backend.
//!
//! A [`Manager`] owns exactly one [`StorageBackend`] and composes it with:
//!
//! - an extension allow-list ([`AllowedExtensions`]),
//! - a [`NameGenerator`] for unique and companion names,
//! - a [`SaveStrategy`] deciding what happens to an upload before it is
//!   stored: [`FileStrategy`] passes bytes through, [`ImageStrategy`] runs the
//!   decode → resize → thumbnail → postprocess → encode pipeline,
//! - a [`ServeRoute`] for building URLs through the serve endpoint.
//!
//! Every other operation is a thin pass-through to the backend.
//!
//! The non-overwrite save path checks for an existing name and then writes;
//! the two steps are not atomic, so concurrent saves of the same name can both
//! succeed and the last write wins.

mod file;
mod image;

pub use file::FileStrategy;
pub use image::{DEFAULT_KEEP_FORMATS, DEFAULT_THUMBNAIL_SIZE, ImageStrategy};

use crate::endpoint::ServeRoute;
use crate::error::{MediaError, Result};
use crate::extensions::AllowedExtensions;
use crate::imaging::{DecodedImage, Quality, Size, Transform};
use crate::naming::{self, NameGenerator, UuidNameGen};
use crate::storage::{
    AssetWriter, Content, Metadata, NameIter, Payload, Served, StorageBackend,
};
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info};

/// What is being saved.
pub enum AssetBody {
    Bytes(Vec<u8>),
    Reader(Box<dyn Read + Send>),
    /// An image already decoded in memory.
    Image(DecodedImage),
}

/// An upload: its content plus the client-supplied filename, if any.
pub struct Asset {
    pub filename: Option<String>,
    pub body: AssetBody,
}

impl Asset {
    /// Raw bytes with no original filename.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: None,
            body: AssetBody::Bytes(bytes.into()),
        }
    }

    /// An uploaded file: bytes plus the name the client sent.
    pub fn upload(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: Some(filename.into()),
            body: AssetBody::Bytes(bytes.into()),
        }
    }

    pub fn stream(filename: Option<String>, reader: Box<dyn Read + Send>) -> Self {
        Self {
            filename,
            body: AssetBody::Reader(reader),
        }
    }

    pub fn image(image: impl Into<DecodedImage>) -> Self {
        Self {
            filename: None,
            body: AssetBody::Image(image.into()),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = match &self.body {
            AssetBody::Bytes(b) => format!("{} bytes", b.len()),
            AssetBody::Reader(_) => "stream".to_string(),
            AssetBody::Image(img) => format!("image {:?}", img.dimensions()),
        };
        f.debug_struct("Asset")
            .field("filename", &self.filename)
            .field("body", &body)
            .finish()
    }
}

/// Per-call save options. Unset fields fall back to the manager's config.
#[derive(Clone)]
pub struct SaveOptions {
    pub overwrite: bool,
    /// Replace the filename with a generated unique one. Defaults to `false`
    /// for file managers and `true` for image managers.
    pub generate_name: Option<bool>,
    /// Resize bound for this save (image managers).
    pub size: Option<Size>,
    pub thumbnail_size: Option<Size>,
    pub create_thumbnail: bool,
    pub quality: Option<Quality>,
    pub postprocess: Option<Arc<dyn Transform>>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            generate_name: None,
            size: None,
            thumbnail_size: None,
            create_thumbnail: true,
            quality: None,
            postprocess: None,
        }
    }
}

impl SaveOptions {
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn generate_name(mut self, generate: bool) -> Self {
        self.generate_name = Some(generate);
        self
    }

    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn create_thumbnail(mut self, create: bool) -> Self {
        self.create_thumbnail = create;
        self
    }
}

impl std::fmt::Debug for SaveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveOptions")
            .field("overwrite", &self.overwrite)
            .field("generate_name", &self.generate_name)
            .field("size", &self.size)
            .field("thumbnail_size", &self.thumbnail_size)
            .field("create_thumbnail", &self.create_thumbnail)
            .field("quality", &self.quality)
            .field("postprocess", &self.postprocess.is_some())
            .finish()
    }
}

/// The storage side of a save, handed to a [`SaveStrategy`].
pub struct AssetSink<'a> {
    pub storage: &'a dyn StorageBackend,
    pub extensions: &'a AllowedExtensions,
    pub namegen: &'a dyn NameGenerator,
    pub overwrite: bool,
}

impl AssetSink<'_> {
    /// Allow-list and existence checks for a main asset name.
    pub fn check(&self, name: &str) -> Result<()> {
        let ext = naming::extension(name);
        if !self.extensions.allows(&ext) {
            return Err(MediaError::invalid(format!("file type not allowed: {name}")));
        }
        if !self.overwrite && self.storage.exists(name)? {
            return Err(MediaError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    /// Check, then store.
    pub fn store(&self, payload: Payload, name: &str) -> Result<String> {
        self.check(name)?;
        self.storage.save(payload, name)
    }

    /// Store without checks; the caller already ran [`check`](Self::check).
    pub fn store_checked(&self, payload: Payload, name: &str) -> Result<String> {
        self.storage.save(payload, name)
    }

    /// Store a derived rendition (thumbnail). Companions follow their main
    /// asset and are always overwritten.
    pub fn store_companion(&self, bytes: &[u8], name: &str) -> Result<String> {
        self.storage.write(name, Content::Bytes(bytes))
    }
}

/// "Transform before store": what a manager does with an upload.
pub trait SaveStrategy: Send + Sync {
    /// Manager kind name (`"file"`, `"image"`).
    fn kind(&self) -> &'static str;

    /// Turn `asset` into stored bytes. Returns the final stored name.
    fn save(
        &self,
        sink: &AssetSink<'_>,
        asset: Asset,
        name: Option<&str>,
        options: &SaveOptions,
    ) -> Result<String>;

    /// Derived renditions of `name` that are removed along with it.
    fn companions(&self, _namegen: &dyn NameGenerator, _name: &str) -> Vec<String> {
        Vec::new()
    }

    fn has_thumbnails(&self) -> bool {
        false
    }
}

/// The name to store an asset under: the explicit one if given, otherwise the
/// upload's filename sanitized with its extension lower-cased.
pub fn resolve_filename(explicit: Option<&str>, upload: Option<&str>) -> Result<String> {
    if let Some(name) = explicit.filter(|n| !n.is_empty()) {
        return Ok(name.to_string());
    }
    upload
        .map(|f| naming::lower_extension(&naming::secure_filename(f)))
        .filter(|f| !f.is_empty())
        .ok_or_else(|| MediaError::invalid("filename is required"))
}

pub struct Manager {
    name: String,
    storage: Box<dyn StorageBackend>,
    extensions: AllowedExtensions,
    namegen: Arc<dyn NameGenerator>,
    strategy: Box<dyn SaveStrategy>,
    route: ServeRoute,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("name", &self.name)
            .field("kind", &self.strategy.kind())
            .field("storage", &self.storage.kind())
            .field("extensions", &self.extensions)
            .field("route", &self.route)
            .finish()
    }
}

impl Manager {
    pub fn new(
        name: impl Into<String>,
        storage: Box<dyn StorageBackend>,
        strategy: Box<dyn SaveStrategy>,
    ) -> Self {
        Self {
            name: name.into().to_lowercase(),
            storage,
            extensions: AllowedExtensions::All,
            namegen: Arc::new(UuidNameGen::new()),
            strategy,
            route: ServeRoute::default(),
        }
    }

    /// A plain file manager.
    pub fn file(name: impl Into<String>, storage: Box<dyn StorageBackend>) -> Self {
        Self::new(name, storage, Box::new(FileStrategy))
    }

    pub fn with_extensions(mut self, extensions: AllowedExtensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_namegen(mut self, namegen: Arc<dyn NameGenerator>) -> Self {
        self.namegen = namegen;
        self
    }

    pub fn with_route(mut self, route: ServeRoute) -> Self {
        self.route = route;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &'static str {
        self.strategy.kind()
    }

    pub fn storage(&self) -> &dyn StorageBackend {
        self.storage.as_ref()
    }

    pub fn extensions(&self) -> &AllowedExtensions {
        &self.extensions
    }

    /// Save an upload. `name` overrides the upload's own filename.
    pub fn save(&self, asset: Asset, name: Option<&str>, options: SaveOptions) -> Result<String> {
        let sink = AssetSink {
            storage: self.storage.as_ref(),
            extensions: &self.extensions,
            namegen: self.namegen.as_ref(),
            overwrite: options.overwrite,
        };
        let stored = self.strategy.save(&sink, asset, name, &options)?;
        info!(manager = %self.name, name = %stored, "Saved asset");
        Ok(stored)
    }

    /// Public URL of `name`: direct from the backend when it has a base URL,
    /// otherwise through the serve route.
    pub fn url(&self, name: &str, external: bool) -> Result<String> {
        match self.storage.base_url() {
            Some(base) => Ok(join_url(base, &self.storage.key(name))),
            None => self.route.url(&self.name, name, external),
        }
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        self.storage.exists(name)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.storage.read(name)
    }

    pub fn write(&self, name: &str, content: Content<'_>, overwrite: bool) -> Result<String> {
        if !overwrite && self.storage.exists(name)? {
            return Err(MediaError::AlreadyExists(name.to_string()));
        }
        self.storage.write(name, content)
    }

    /// Delete `name` and its companions. Missing companions are ignored.
    pub fn delete(&self, name: &str) -> Result<()> {
        self.storage.delete(name)?;
        for companion in self.strategy.companions(self.namegen.as_ref(), name) {
            match self.storage.delete(&companion) {
                Ok(()) => debug!(name = %companion, "Deleted companion"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        info!(manager = %self.name, name, "Deleted asset");
        Ok(())
    }

    pub fn list(&self) -> Result<NameIter<'_>> {
        self.storage.list()
    }

    pub fn metadata(&self, name: &str) -> Result<Metadata> {
        self.storage.metadata(name)
    }

    pub fn archive_files(&self, out_name: &str, names: &[&str]) -> Result<String> {
        let stored = self.storage.archive(out_name, names)?;
        info!(manager = %self.name, name = %stored, members = names.len(), "Archived assets");
        Ok(stored)
    }

    /// Backends report a missing asset as `NotFound` themselves.
    pub fn serve(&self, name: &str) -> Result<Served> {
        self.storage.serve(name)
    }

    pub fn generate_name(&self, filename: &str) -> String {
        self.namegen.generate_name(filename)
    }

    pub fn original_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.namegen.original_name(name)
    }

    /// Thumbnail companion name, for managers that produce thumbnails.
    pub fn thumbnail_name(&self, name: &str) -> Option<String> {
        self.strategy
            .has_thumbnails()
            .then(|| self.namegen.thumbnail_name(name))
    }

    pub fn thumbnail_url(&self, name: &str, external: bool) -> Result<String> {
        let thumb = self
            .thumbnail_name(name)
            .ok_or(MediaError::Unsupported("thumbnails"))?;
        self.url(&thumb, external)
    }

    pub fn copy(&self, name: &str, target: &str) -> Result<()> {
        self.storage.copy(name, target)
    }

    pub fn move_to(&self, name: &str, target: &str) -> Result<()> {
        self.storage.move_to(name, target)
    }

    pub fn open_read(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        self.storage.open_read(name)
    }

    pub fn open_write(&self, name: &str) -> Result<Box<dyn AssetWriter>> {
        self.storage.open_write(name)
    }
}

fn join_url(base: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}
