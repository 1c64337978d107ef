//! Local filesystem backend.
//!
//! Asset names map to paths under a root directory:
//!
//! ```text
//! media/                 <- root
//! ├── report.pdf         <- "report.pdf"
//! └── avatars/
//!     ├── me.png         <- "avatars/me.png"
//!     └── me_thumb.png   <- "avatars/me_thumb.png"
//! ```
//!
//! Writes land in a temp file next to the target and are renamed into place
//! on commit, so readers never observe a half-written asset. Names that are
//! absolute or contain `..` segments are rejected before touching the disk.

use super::{
    AssetWriter, Content, Metadata, NameIter, Served, StorageBackend, check_name, guess_mime,
};
use crate::error::{MediaError, Result};
use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

/// Checksums are computed over the file in chunks of this size.
const CHUNK_SIZE: usize = 1 << 16;

/// Prefix of in-flight temp files; hidden from listings.
const TEMP_PREFIX: &str = ".upload-";

/// Default mode for stored files. Directories additionally get `0o111`.
pub const DEFAULT_PERMISSION: u32 = 0o644;

/// Where the backend's root directory lives.
#[derive(Clone)]
pub enum Root {
    Fixed(PathBuf),
    /// Re-evaluated on every operation (per-tenant or per-test roots).
    Dynamic(Arc<dyn Fn() -> PathBuf + Send + Sync>),
}

impl Root {
    pub fn resolve(&self) -> PathBuf {
        match self {
            Self::Fixed(path) => path.clone(),
            Self::Dynamic(f) => f(),
        }
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(path) => f.debug_tuple("Fixed").field(path).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<PathBuf> for Root {
    fn from(path: PathBuf) -> Self {
        Self::Fixed(path)
    }
}

impl From<&Path> for Root {
    fn from(path: &Path) -> Self {
        Self::Fixed(path.to_path_buf())
    }
}

impl From<&str> for Root {
    fn from(path: &str) -> Self {
        Self::Fixed(PathBuf::from(path))
    }
}

#[derive(Debug)]
pub struct LocalStorage {
    root: Root,
    public_view: bool,
    permission: u32,
    base_url: Option<String>,
}

impl LocalStorage {
    /// Create the backend with [`DEFAULT_PERMISSION`], creating the root
    /// directory if it is missing.
    pub fn new(root: impl Into<Root>) -> Result<Self> {
        Self::open(root, DEFAULT_PERMISSION)
    }

    /// Create the backend. Stored files get `permission`; directories,
    /// including a newly created root, get `permission | 0o111`.
    #[tracing::instrument(skip(root))]
    pub fn open(root: impl Into<Root>, permission: u32) -> Result<Self> {
        let storage = Self {
            root: root.into(),
            public_view: true,
            permission,
            base_url: None,
        };
        let root = storage.root.resolve();
        let created = !root.exists();
        storage.create_dirs(&root)?;
        if created {
            storage.apply_mode(&root, permission | 0o111)?;
        }
        tracing::info!(path = %root.display(), "Opened local storage");
        Ok(storage)
    }

    pub fn with_public_view(mut self, public_view: bool) -> Self {
        self.public_view = public_view;
        self
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn root(&self) -> PathBuf {
        self.root.resolve()
    }

    pub fn permission(&self) -> u32 {
        self.permission
    }

    fn full_path(&self, name: &str) -> Result<PathBuf> {
        check_name(name)?;
        Ok(self.root.resolve().join(name))
    }

    /// Recursive create; an already existing directory (ours or a concurrent
    /// creator's) is fine.
    fn create_dirs(&self, dir: &Path) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(self.permission | 0o111);
        builder
            .create(dir)
            .map_err(|e| MediaError::backend(format!("creating {}", dir.display()), e))
    }

    fn ensure_parent(&self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) => self.create_dirs(parent),
            None => Ok(()),
        }
    }

    fn apply_permission(&self, path: &Path) -> Result<()> {
        self.apply_mode(path, self.permission)
    }

    fn apply_mode(&self, path: &Path, mode: u32) -> Result<()> {
        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| MediaError::backend(format!("chmod {}", path.display()), e))?;
        #[cfg(not(unix))]
        let _ = (path, mode);
        Ok(())
    }
}

impl StorageBackend for LocalStorage {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn public_view(&self) -> bool {
        self.public_view
    }

    fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.full_path(name)?.exists())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        fs::read(self.full_path(name)?).map_err(|e| MediaError::io(name, e))
    }

    #[tracing::instrument(skip(self, content), fields(size = content.as_bytes().len()))]
    fn write(&self, name: &str, content: Content<'_>) -> Result<String> {
        let mut writer = self.open_write(name)?;
        writer
            .write_all(content.as_bytes())
            .map_err(|e| MediaError::io(name, e))?;
        writer.commit()?;
        tracing::debug!(name, "Wrote local asset");
        Ok(name.to_string())
    }

    #[tracing::instrument(skip(self))]
    fn delete(&self, name: &str) -> Result<()> {
        let path = self.full_path(name)?;
        let meta = fs::symlink_metadata(&path).map_err(|e| MediaError::io(name, e))?;
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| MediaError::io(name, e))?;
        tracing::debug!(name, "Deleted local asset");
        Ok(())
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(self.full_path(name)?).map_err(|e| MediaError::io(name, e))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, name: &str) -> Result<Box<dyn AssetWriter>> {
        let dest = self.full_path(name)?;
        self.ensure_parent(&dest)?;
        let dir = dest.parent().unwrap_or(Path::new("."));
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| MediaError::io(name, e))?;
        Ok(Box::new(LocalWriter {
            temp,
            dest,
            name: name.to_string(),
            permission: self.permission,
        }))
    }

    fn copy(&self, name: &str, target: &str) -> Result<()> {
        let src = self.full_path(name)?;
        let dest = self.full_path(target)?;
        self.ensure_parent(&dest)?;
        fs::copy(&src, &dest).map_err(|e| MediaError::io(name, e))?;
        self.apply_permission(&dest)
    }

    fn move_to(&self, name: &str, target: &str) -> Result<()> {
        let src = self.full_path(name)?;
        let dest = self.full_path(target)?;
        self.ensure_parent(&dest)?;
        fs::rename(&src, &dest).map_err(|e| MediaError::io(name, e))
    }

    fn list(&self) -> Result<NameIter<'_>> {
        let root = self.root.resolve();
        let walker = WalkDir::new(&root).min_depth(1).into_iter();
        let names = walker.filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_file() => {
                let hidden = entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(TEMP_PREFIX);
                (!hidden).then(|| Ok(relative_name(&root, entry.path())))
            }
            Ok(_) => None,
            Err(e) => Some(Err(MediaError::backend("walking local storage", e))),
        });
        Ok(Box::new(names))
    }

    fn metadata(&self, name: &str) -> Result<Metadata> {
        let path = self.full_path(name)?;
        let mut file = fs::File::open(&path).map_err(|e| MediaError::io(name, e))?;
        let checksum = sha1_hex(&mut file).map_err(|e| MediaError::io(name, e))?;
        let stat = file.metadata().map_err(|e| MediaError::io(name, e))?;
        let modified = stat.modified().map_err(|e| MediaError::io(name, e))?;

        Ok(Metadata {
            checksum: format!("sha1:{checksum}"),
            size: stat.len(),
            mime: guess_mime(name),
            modified: DateTime::<Utc>::from(modified),
        })
    }

    fn serve(&self, name: &str) -> Result<Served> {
        if !self.public_view {
            return Err(MediaError::Forbidden(name.to_string()));
        }
        let path = self.full_path(name)?;
        if !path.is_file() {
            return Err(MediaError::NotFound(name.to_string()));
        }
        let body = fs::read(&path).map_err(|e| MediaError::io(name, e))?;
        Ok(Served::Content {
            body,
            mime: guess_mime(name),
        })
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        self.full_path(name)
    }
}

/// Temp file in the destination directory, renamed into place on commit.
struct LocalWriter {
    temp: NamedTempFile,
    dest: PathBuf,
    name: String,
    permission: u32,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.temp.flush()
    }
}

impl AssetWriter for LocalWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        let LocalWriter {
            mut temp,
            dest,
            name,
            permission,
        } = *self;
        temp.flush().map_err(|e| MediaError::io(&name, e))?;
        #[cfg(unix)]
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(permission))
            .map_err(|e| MediaError::io(&name, e))?;
        #[cfg(not(unix))]
        let _ = permission;
        temp.persist(&dest).map_err(|e| MediaError::io(&name, e.error))?;
        Ok(())
    }
}

fn sha1_hex(reader: &mut impl Read) -> std::io::Result<String> {
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// `/`-separated name of `path` relative to `root`.
fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, LocalStorage) {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("media")).unwrap();
        (tmp, storage)
    }

    #[test]
    fn new_creates_missing_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("a/b/c");
        LocalStorage::new(root.clone()).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn write_read_round_trip_creates_parents() {
        let (_tmp, storage) = storage();
        storage.write("deep/dir/file.bin", Content::Bytes(&[0, 1, 2, 255])).unwrap();
        assert_eq!(storage.read("deep/dir/file.bin").unwrap(), vec![0, 1, 2, 255]);
        assert!(storage.exists("deep/dir/file.bin").unwrap());
        assert!(storage.exists("deep/dir").unwrap());
    }

    #[test]
    fn read_missing_is_not_found() {
        let (_tmp, storage) = storage();
        assert!(storage.read("nope.txt").unwrap_err().is_not_found());
        assert!(!storage.exists("nope.txt").unwrap());
    }

    #[test]
    fn traversal_is_rejected() {
        let (_tmp, storage) = storage();
        let err = storage.write("../escape.txt", "x".into()).unwrap_err();
        assert!(matches!(err, MediaError::InvalidArgument(_)));
        assert!(storage.read("/etc/passwd").is_err());
    }

    #[test]
    fn delete_file_and_directory() {
        let (_tmp, storage) = storage();
        storage.write("dir/a.txt", "a".into()).unwrap();
        storage.write("dir/sub/b.txt", "b".into()).unwrap();
        storage.write("c.txt", "c".into()).unwrap();

        storage.delete("c.txt").unwrap();
        assert!(!storage.exists("c.txt").unwrap());

        storage.delete("dir").unwrap();
        assert!(!storage.exists("dir/sub/b.txt").unwrap());
        assert!(storage.delete("dir").unwrap_err().is_not_found());
    }

    #[test]
    fn uncommitted_writer_leaves_nothing() {
        let (_tmp, storage) = storage();
        {
            let mut writer = storage.open_write("draft.txt").unwrap();
            writer.write_all(b"partial").unwrap();
        }
        assert!(!storage.exists("draft.txt").unwrap());
        assert_eq!(storage.list().unwrap().count(), 0);
    }

    #[test]
    fn committed_writer_is_visible() {
        let (_tmp, storage) = storage();
        let mut writer = storage.open_write("final.txt").unwrap();
        writer.write_all(b"done").unwrap();
        writer.commit().unwrap();
        assert_eq!(storage.read("final.txt").unwrap(), b"done");
    }

    #[test]
    fn list_walks_recursively_with_slash_names() {
        let (_tmp, storage) = storage();
        storage.write("a.txt", "a".into()).unwrap();
        storage.write("x/y/b.txt", "b".into()).unwrap();

        let mut names: Vec<String> = storage.list().unwrap().map(|n| n.unwrap()).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "x/y/b.txt"]);

        // restartable
        assert_eq!(storage.list().unwrap().count(), 2);
    }

    #[test]
    fn metadata_has_sha1_checksum() {
        let (_tmp, storage) = storage();
        storage.write("hello.txt", "hello".into()).unwrap();
        let meta = storage.metadata("hello.txt").unwrap();
        assert_eq!(
            meta.checksum,
            "sha1:aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert_eq!(meta.size, 5);
        assert_eq!(meta.mime, "text/plain");
    }

    #[test]
    fn copy_and_move() {
        let (_tmp, storage) = storage();
        storage.write("src.txt", "data".into()).unwrap();

        storage.copy("src.txt", "copies/dst.txt").unwrap();
        assert_eq!(storage.read("copies/dst.txt").unwrap(), b"data");
        assert!(storage.exists("src.txt").unwrap());

        storage.move_to("src.txt", "moved/src.txt").unwrap();
        assert!(!storage.exists("src.txt").unwrap());
        assert_eq!(storage.read("moved/src.txt").unwrap(), b"data");
    }

    #[test]
    fn serve_respects_public_view() {
        let (tmp, storage) = storage();
        storage.write("page.html", "<p>".into()).unwrap();
        assert_eq!(
            storage.serve("page.html").unwrap(),
            Served::Content {
                body: b"<p>".to_vec(),
                mime: "text/html".into()
            }
        );
        assert!(storage.serve("missing.html").unwrap_err().is_not_found());

        let private = LocalStorage::new(tmp.path().join("media"))
            .unwrap()
            .with_public_view(false);
        assert!(matches!(
            private.serve("page.html"),
            Err(MediaError::Forbidden(_))
        ));
    }

    #[test]
    fn dynamic_root_is_resolved_per_call() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().to_path_buf();
        let storage = LocalStorage::new(Root::Dynamic(Arc::new(move || base.join("dyn")))).unwrap();
        storage.write("a.txt", "a".into()).unwrap();
        assert!(tmp.path().join("dyn/a.txt").is_file());
        assert_eq!(storage.path("a.txt").unwrap(), tmp.path().join("dyn/a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn permission_is_applied_to_files() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::open(tmp.path().join("media"), 0o600).unwrap();
        storage.write("secret.txt", "s".into()).unwrap();
        let mode = fs::metadata(storage.path("secret.txt").unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn permission_is_applied_to_new_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("private");
        LocalStorage::open(root.clone(), 0o600).unwrap();
        let mode = fs::metadata(&root).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o711);
    }

    #[cfg(unix)]
    #[test]
    fn existing_root_keeps_its_mode() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("shared");
        fs::create_dir(&root).unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o750)).unwrap();
        LocalStorage::open(root.clone(), 0o600).unwrap();
        let mode = fs::metadata(&root).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }
}
