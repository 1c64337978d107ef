//! Remote object-store backend (S3 and S3-compatible services).
//!
//! Asset names become object keys under an optional prefix:
//! `prefix/avatars/me.png`. Object stores have no real directories, so
//! `exists` falls back to a prefix listing when the exact key is absent,
//! and `delete` on a prefix removes every object under it.
//!
//! The `object_store` client is async; this backend owns a small tokio
//! runtime and blocks on it for each call. Called from inside a
//! multi-threaded runtime the wait goes through `block_in_place`; inside a
//! current-thread runtime it moves to a scoped thread.

use super::{
    AssetWriter, Content, DEFAULT_MIME, Metadata, NameIter, Served, StorageBackend, check_name,
    guess_mime,
};
use crate::error::{MediaError, Result};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{
    Attribute, AttributeValue, Attributes, ClientOptions, GetOptions, ObjectMeta, ObjectStore,
    PutOptions, PutPayload,
};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tracing::{debug, info};

/// Canned ACL applied to every upload unless configured otherwise.
pub const DEFAULT_ACL: &str = "public-read";

/// Region S3 creates buckets in when no location constraint is sent.
const DEFAULT_REGION: &str = "us-east-1";

/// Lifetime of the presigned bucket-management URLs.
const SIGNED_URL_TTL: Duration = Duration::from_secs(60);

/// Connection settings for an S3 bucket.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...).
    pub endpoint: Option<String>,
    /// Canned ACL sent as `x-amz-acl` on uploads.
    pub acl: Option<String>,
}

impl S3Settings {
    /// Virtual-hosted public URL of the bucket, or path-style for custom
    /// endpoints.
    pub fn public_base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com/", self.bucket, self.region),
        }
    }
}

/// Backend-independent knobs.
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    /// Key prefix for every asset.
    pub prefix: Option<String>,
    pub public_view: bool,
    /// Base for direct URLs; `serve` redirects to `base_url + key`.
    pub base_url: Option<String>,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            public_view: true,
            base_url: None,
        }
    }
}

/// Owned runtime behind the blocking facade.
///
/// Dropped with `shutdown_background`, so a backend can be dropped from
/// inside another runtime.
struct BlockingRuntime(Option<Runtime>);

impl BlockingRuntime {
    fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("media-remote")
            .enable_all()
            .build()
            .map_err(|e| MediaError::backend("starting object-store runtime", e))?;
        Ok(Self(Some(runtime)))
    }

    /// Drive `future` to completion on the owned runtime, whatever runtime
    /// context the caller is in.
    fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send,
        F::Output: Send,
    {
        let runtime = match &self.0 {
            Some(runtime) => runtime,
            None => unreachable!("runtime is only taken on drop"),
        };
        match Handle::try_current().map(|handle| handle.runtime_flavor()) {
            Ok(RuntimeFlavor::MultiThread) => {
                tokio::task::block_in_place(|| runtime.block_on(future))
            }
            Ok(_) => std::thread::scope(|scope| {
                match scope.spawn(|| runtime.block_on(future)).join() {
                    Ok(output) => output,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }),
            Err(_) => runtime.block_on(future),
        }
    }
}

impl Drop for BlockingRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

pub struct RemoteStorage {
    store: Arc<dyn ObjectStore>,
    runtime: Arc<BlockingRuntime>,
    prefix: Option<String>,
    public_view: bool,
    base_url: Option<String>,
}

impl std::fmt::Debug for RemoteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStorage")
            .field("store", &self.store.to_string())
            .field("prefix", &self.prefix)
            .field("public_view", &self.public_view)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl RemoteStorage {
    /// Wrap an already built store (any `object_store` implementation).
    pub fn with_store(store: Arc<dyn ObjectStore>, options: RemoteOptions) -> Result<Self> {
        let runtime = BlockingRuntime::new()?;

        let prefix = options
            .prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        if let Some(prefix) = &prefix {
            parse_key(prefix)?;
        }
        let base_url = options.base_url.map(|url| {
            if url.ends_with('/') {
                url
            } else {
                format!("{url}/")
            }
        });

        Ok(Self {
            store,
            runtime: Arc::new(runtime),
            prefix,
            public_view: options.public_view,
            base_url,
        })
    }

    /// Build an S3 client, creating the bucket if it does not exist yet.
    pub fn s3(settings: &S3Settings, mut options: RemoteOptions) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region);

        if let Some(endpoint) = &settings.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(access_key) = &settings.access_key {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = &settings.secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }

        let acl = settings.acl.as_deref().unwrap_or(DEFAULT_ACL);
        let acl = HeaderValue::from_str(acl)
            .map_err(|_| MediaError::invalid(format!("invalid object ACL: {acl}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-amz-acl"), acl);
        builder = builder.with_client_options(ClientOptions::new().with_default_headers(headers));

        let store = builder
            .build()
            .map_err(|e| MediaError::backend("creating S3 client", e))?;

        info!(
            "Created S3 storage for bucket: {}, prefix: {:?}",
            settings.bucket, options.prefix
        );

        if options.base_url.is_none() {
            options.base_url = Some(settings.public_base_url());
        }
        let store = Arc::new(store);
        let storage = Self::with_store(Arc::clone(&store) as Arc<dyn ObjectStore>, options)?;
        storage
            .runtime
            .block_on(ensure_bucket(&store, &settings.bucket, &settings.region))?;
        Ok(storage)
    }

    fn full_path(&self, name: &str) -> Result<Path> {
        check_name(name)?;
        parse_key(&self.key(name))
    }

    fn strip_prefix(&self, location: &Path) -> String {
        let key = location.to_string();
        match &self.prefix {
            Some(prefix) => key
                .strip_prefix(&format!("{prefix}/"))
                .map(str::to_string)
                .unwrap_or(key),
            None => key,
        }
    }

    fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send,
        F::Output: Send,
    {
        self.runtime.block_on(future)
    }

    fn put(&self, path: &Path, name: &str, bytes: Bytes) -> Result<()> {
        debug!("S3 PUT: {}", path);
        self.block_on(put_object(self.store.as_ref(), path, bytes, &guess_mime(name)))
            .map_err(|e| store_error(name, "PUT", e))
    }

    /// Whether any object lives under `path` used as a directory prefix.
    fn prefix_exists(&self, path: &Path) -> object_store::Result<bool> {
        let listing = self.block_on(self.store.list_with_delimiter(Some(path)))?;
        Ok(!listing.objects.is_empty() || !listing.common_prefixes.is_empty())
    }
}

/// Object keys are used verbatim; `Path::from` would percent-encode them and
/// listings would no longer match the stored names.
fn parse_key(key: &str) -> Result<Path> {
    Path::parse(key).map_err(|e| MediaError::invalid(format!("invalid object name {key:?}: {e}")))
}

/// `HEAD` the bucket and `PUT` it when the probe fails.
async fn ensure_bucket(store: &AmazonS3, bucket: &str, region: &str) -> Result<()> {
    let root = Path::default();
    let client = reqwest::Client::new();

    let url = store
        .signed_url(Method::HEAD, &root, SIGNED_URL_TTL)
        .await
        .map_err(|e| MediaError::backend("signing S3 HeadBucket", e))?;
    let probe = client
        .head(url.as_str())
        .send()
        .await
        .map_err(|e| MediaError::backend(format!("S3 HeadBucket failed for {bucket}"), e))?;
    if probe.status().is_success() {
        debug!("S3 bucket exists: {}", bucket);
        return Ok(());
    }

    let url = store
        .signed_url(Method::PUT, &root, SIGNED_URL_TTL)
        .await
        .map_err(|e| MediaError::backend("signing S3 CreateBucket", e))?;
    let response = client
        .put(url.as_str())
        .body(create_bucket_body(region))
        .send()
        .await
        .map_err(|e| MediaError::backend(format!("S3 CreateBucket failed for {bucket}"), e))?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !bucket_ready(status, &body) {
        return Err(MediaError::backend(
            format!("S3 CreateBucket failed for {bucket}"),
            format!("{status}: {body}"),
        ));
    }
    info!("Created S3 bucket: {}", bucket);
    Ok(())
}

fn create_bucket_body(region: &str) -> String {
    if region.is_empty() || region == DEFAULT_REGION {
        return String::new();
    }
    format!(
        "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <LocationConstraint>{region}</LocationConstraint>\
         </CreateBucketConfiguration>"
    )
}

/// A created bucket, or one that already exists.
fn bucket_ready(status: StatusCode, body: &str) -> bool {
    status.is_success()
        || (status == StatusCode::CONFLICT
            && ["BucketAlreadyOwnedByYou", "BucketAlreadyExists"]
                .iter()
                .any(|code| body.contains(&format!("<Code>{code}</Code>"))))
}

async fn put_object(
    store: &dyn ObjectStore,
    path: &Path,
    bytes: Bytes,
    mime: &str,
) -> object_store::Result<()> {
    let mut attributes = Attributes::new();
    attributes.insert(Attribute::ContentType, AttributeValue::from(mime.to_string()));
    let opts = PutOptions {
        attributes,
        ..Default::default()
    };
    store.put_opts(path, PutPayload::from_bytes(bytes), opts).await?;
    Ok(())
}

/// Delete the object at `path`, or every object under it as a prefix.
/// Returns how many objects were removed.
async fn delete_all(store: &dyn ObjectStore, path: &Path) -> object_store::Result<usize> {
    match store.head(path).await {
        Ok(_) => {
            store.delete(path).await?;
            Ok(1)
        }
        Err(object_store::Error::NotFound { .. }) => {
            let locations: Vec<Path> = store
                .list(Some(path))
                .map_ok(|meta| meta.location)
                .try_collect()
                .await?;
            for location in &locations {
                store.delete(location).await?;
            }
            Ok(locations.len())
        }
        Err(e) => Err(e),
    }
}

fn store_error(name: &str, op: &str, err: object_store::Error) -> MediaError {
    match err {
        object_store::Error::NotFound { .. } => MediaError::NotFound(name.to_string()),
        other => MediaError::backend(format!("S3 {op} failed for {name}"), other),
    }
}

impl StorageBackend for RemoteStorage {
    fn kind(&self) -> &'static str {
        "s3"
    }

    fn public_view(&self) -> bool {
        self.public_view
    }

    fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn key(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{name}"),
            None => name.to_string(),
        }
    }

    fn exists(&self, name: &str) -> Result<bool> {
        let path = self.full_path(name)?;
        debug!("S3 HEAD: {}", path);
        match self.block_on(self.store.head(&path)) {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => self
                .prefix_exists(&path)
                .map_err(|e| store_error(name, "LIST", e)),
            Err(e) => Err(store_error(name, "HEAD", e)),
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.full_path(name)?;
        debug!("S3 GET: {}", path);
        let bytes = self
            .block_on(async {
                let result = self.store.get(&path).await?;
                let bytes = result.bytes().await?;
                Ok::<_, object_store::Error>(bytes)
            })
            .map_err(|e| store_error(name, "GET", e))?;
        Ok(bytes.to_vec())
    }

    #[tracing::instrument(skip(self, content), fields(size = content.as_bytes().len()))]
    fn write(&self, name: &str, content: Content<'_>) -> Result<String> {
        let path = self.full_path(name)?;
        self.put(&path, name, Bytes::copy_from_slice(content.as_bytes()))?;
        Ok(name.to_string())
    }

    #[tracing::instrument(skip(self))]
    fn delete(&self, name: &str) -> Result<()> {
        let path = self.full_path(name)?;
        debug!("S3 DELETE: {}", path);
        let deleted = self
            .block_on(delete_all(self.store.as_ref(), &path))
            .map_err(|e| store_error(name, "DELETE", e))?;

        if deleted == 0 {
            return Err(MediaError::NotFound(name.to_string()));
        }
        Ok(())
    }

    fn open_write(&self, name: &str) -> Result<Box<dyn AssetWriter>> {
        let path = self.full_path(name)?;
        Ok(Box::new(RemoteWriter {
            store: Arc::clone(&self.store),
            runtime: Arc::clone(&self.runtime),
            path,
            mime: guess_mime(name),
            name: name.to_string(),
            buffer: Vec::new(),
        }))
    }

    fn copy(&self, name: &str, target: &str) -> Result<()> {
        let from = self.full_path(name)?;
        let to = self.full_path(target)?;
        debug!("S3 COPY: {} -> {}", from, to);
        self.block_on(self.store.copy(&from, &to))
            .map_err(|e| store_error(name, "COPY", e))
    }

    /// A single bucket has no cheap rename.
    fn move_to(&self, _name: &str, _target: &str) -> Result<()> {
        Err(MediaError::Unsupported("move"))
    }

    fn list(&self) -> Result<NameIter<'_>> {
        let prefix = self.prefix.as_deref().map(parse_key).transpose()?;
        debug!("S3 LIST: {:?}", prefix);
        let stream = self.store.list(prefix.as_ref());
        Ok(Box::new(RemoteNames {
            storage: self,
            stream,
        }))
    }

    fn metadata(&self, name: &str) -> Result<Metadata> {
        let path = self.full_path(name)?;
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = self
            .block_on(self.store.get_opts(&path, options))
            .map_err(|e| store_error(name, "HEAD", e))?;

        let declared = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| AsRef::<str>::as_ref(value).to_string())
            .filter(|mime| !mime.is_empty() && mime != DEFAULT_MIME);

        Ok(Metadata {
            checksum: result
                .meta
                .e_tag
                .as_deref()
                .unwrap_or_default()
                .trim_matches('"')
                .to_string(),
            size: result.meta.size as u64,
            mime: declared.unwrap_or_else(|| guess_mime(name)),
            modified: result.meta.last_modified,
        })
    }

    fn serve(&self, name: &str) -> Result<Served> {
        if !self.public_view {
            return Err(MediaError::Forbidden(name.to_string()));
        }
        let path = self.full_path(name)?;
        debug!("S3 HEAD: {}", path);
        self.block_on(self.store.head(&path))
            .map_err(|e| store_error(name, "HEAD", e))?;
        let base = self
            .base_url
            .as_deref()
            .ok_or(MediaError::Unsupported("serve without a public base URL"))?;
        Ok(Served::Redirect(format!("{base}{}", self.key(name))))
    }
}

/// Lazy listing: one blocking poll of the object stream per item.
struct RemoteNames<'a> {
    storage: &'a RemoteStorage,
    stream: BoxStream<'a, object_store::Result<ObjectMeta>>,
}

impl Iterator for RemoteNames<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.storage.runtime.block_on(self.stream.next())?;
        Some(
            item.map(|meta| self.storage.strip_prefix(&meta.location))
                .map_err(|e| MediaError::backend("S3 LIST failed", e)),
        )
    }
}

/// Buffers in memory; a single PUT is issued on commit.
struct RemoteWriter {
    store: Arc<dyn ObjectStore>,
    runtime: Arc<BlockingRuntime>,
    path: Path,
    mime: String,
    name: String,
    buffer: Vec<u8>,
}

impl Write for RemoteWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl AssetWriter for RemoteWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        debug!("S3 PUT: {}", self.path);
        let bytes = Bytes::from(self.buffer);
        self.runtime
            .block_on(put_object(self.store.as_ref(), &self.path, bytes, &self.mime))
            .map_err(|e| store_error(&self.name, "PUT", e))
    }
}
