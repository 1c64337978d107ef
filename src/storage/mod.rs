//! Storage backend contract.
//!
//! A [`StorageBackend`] addresses assets by a relative, `/`-separated name and
//! knows how to turn that name into its own addressing scheme (a filesystem
//! path under a root directory, or an object key under a bucket prefix).
//!
//! Only `exists`, `read`, `write` and `delete` are required. Everything else
//! has a provided implementation, either built on the required methods
//! (`save`, `move_to`, `archive`, `open_read`) or failing with
//! [`MediaError::Unsupported`] until a backend overrides it.
//!
//! ## Scoped handles
//!
//! [`StorageBackend::open_write`] returns an [`AssetWriter`]. Bytes written to
//! it become visible only after [`AssetWriter::commit`]; dropping the writer
//! without committing discards them. Readers are plain `Read` trait objects
//! and release their resources on drop.

pub mod archive;
pub mod local;
pub mod remote;

use crate::error::{MediaError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;

pub use local::{LocalStorage, Root};
pub use remote::{RemoteOptions, RemoteStorage, S3Settings};

/// Fallback mime type when neither the backend nor the extension tells us.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// An upload handed to [`StorageBackend::save`].
pub enum Payload {
    Bytes(Vec<u8>),
    Reader(Box<dyn Read + Send>),
}

impl Payload {
    /// Drain the payload into memory.
    pub fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Payload::Bytes({} bytes)", bytes.len()),
            Self::Reader(_) => f.write_str("Payload::Reader(..)"),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Content for [`StorageBackend::write`]. Text is stored as UTF-8.
#[derive(Debug, Clone, Copy)]
pub enum Content<'a> {
    Bytes(&'a [u8]),
    Text(&'a str),
}

impl<'a> Content<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            Self::Bytes(bytes) => bytes,
            Self::Text(text) => text.as_bytes(),
        }
    }
}

impl<'a> From<&'a [u8]> for Content<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Content<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a> From<&'a str> for Content<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a String> for Content<'a> {
    fn from(text: &'a String) -> Self {
        Self::Text(text)
    }
}

/// Per-asset metadata, computed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// `sha1:<hex>` for local files, the store's ETag for remote objects.
    pub checksum: String,
    pub size: u64,
    pub mime: String,
    pub modified: DateTime<Utc>,
}

/// What [`StorageBackend::serve`] hands to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    Content { body: Vec<u8>, mime: String },
    Redirect(String),
}

/// Write side of a scoped handle. Dropping without `commit` discards the data.
pub trait AssetWriter: Write + Send {
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Lazy listing of asset names.
pub type NameIter<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

/// Mime type guessed from a name's extension.
pub fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(DEFAULT_MIME)
        .to_string()
}

/// The capability contract every storage backend satisfies.
pub trait StorageBackend: Send + Sync {
    /// Short kind name (`"local"`, `"s3"`), used in logs.
    fn kind(&self) -> &'static str;

    /// Whether [`serve`](Self::serve) is allowed at all.
    fn public_view(&self) -> bool;

    /// Base URL for direct public addressing, if the backend has one.
    fn base_url(&self) -> Option<&str> {
        None
    }

    /// Backend-native key of `name`, appended to [`base_url`](Self::base_url)
    /// when composing direct URLs.
    fn key(&self, name: &str) -> String {
        name.to_string()
    }

    fn exists(&self, name: &str) -> Result<bool>;

    /// Fails with [`MediaError::NotFound`] when absent.
    fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Write `content`, creating any missing parent path. Returns the name.
    fn write(&self, name: &str, content: Content<'_>) -> Result<String>;

    /// Delete an asset, or everything under `name` when it is a directory or
    /// prefix.
    fn delete(&self, name: &str) -> Result<()>;

    /// Persist an upload. Returns the stored name.
    fn save(&self, payload: Payload, name: &str) -> Result<String> {
        let bytes = payload
            .into_bytes()
            .map_err(|e| MediaError::backend(format!("reading upload for {name}"), e))?;
        self.write(name, Content::Bytes(&bytes))
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.read(name)?)))
    }

    fn open_write(&self, _name: &str) -> Result<Box<dyn AssetWriter>> {
        Err(MediaError::Unsupported("open_write"))
    }

    fn copy(&self, _name: &str, _target: &str) -> Result<()> {
        Err(MediaError::Unsupported("copy"))
    }

    fn move_to(&self, name: &str, target: &str) -> Result<()> {
        self.copy(name, target)?;
        self.delete(name)
    }

    fn list(&self) -> Result<NameIter<'_>> {
        Err(MediaError::Unsupported("list"))
    }

    fn metadata(&self, _name: &str) -> Result<Metadata> {
        Err(MediaError::Unsupported("metadata"))
    }

    /// Zip `names` into `out_name` on this backend. Every constituent is read
    /// before anything is written, so a failed read leaves no archive behind.
    fn archive(&self, out_name: &str, names: &[&str]) -> Result<String> {
        let entries = names
            .iter()
            .map(|name| -> Result<(String, Vec<u8>)> { Ok((name.to_string(), self.read(name)?)) })
            .collect::<Result<Vec<_>>>()?;
        let zipped = archive::zip_entries(&entries)?;
        self.write(out_name, Content::Bytes(&zipped))
    }

    fn serve(&self, _name: &str) -> Result<Served> {
        Err(MediaError::Unsupported("serve"))
    }

    /// Filesystem path of `name`, for backends with direct file access.
    fn path(&self, _name: &str) -> Result<PathBuf> {
        Err(MediaError::Unsupported("path"))
    }
}

/// Reject names that could escape a backend's namespace.
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MediaError::invalid("empty asset name"));
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(MediaError::invalid(format!("asset name must be relative: {name}")));
    }
    if name.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(MediaError::invalid(format!("asset name escapes root: {name}")));
    }
    Ok(())
}
