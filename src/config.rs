//! Media configuration module.
//!
//! Handles loading, validating, and merging the `media.toml` file that
//! describes which managers exist and how each one stores its assets.
//! Configuration is layered: stock defaults are overridden by the file's
//! `[defaults]` table, which is in turn overridden by each
//! `[managers.<name>]` table.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! prefix = "/media"           # Route prefix of the serve endpoint
//! # external_url = "https://cdn.example.com"
//!
//! [defaults]                  # Merged under every manager table
//! manager = "file"            # "file" or "image"
//! storage = "local"           # "local" or "s3"
//! root = "media"              # Local directory, or key prefix on S3
//! public_view = true
//! extensions = []             # Empty = allow everything
//!
//! [managers.photos]
//! manager = "image"
//! extensions = ["IMAGES"]
//! thumbnail_size = [200, 200, true]
//! max_size = [1600, 1600, false]
//! ```
//!
//! When there is no `[managers]` table, a single manager named `media` is
//! built from `[defaults]`.
//!
//! ## Partial Configuration
//!
//! Manager tables are sparse: override just the values you want. Unknown keys
//! are rejected to catch typos early.

use crate::imaging::{CropAnchor, Position, Rotation, Scale, Size, Transform, Watermarker};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Name of the manager built when the file has no `[managers]` table.
pub const DEFAULT_MANAGER_NAME: &str = "media";

/// Top-level configuration loaded from `media.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// Route prefix under which the serve endpoint is mounted.
    pub prefix: String,
    /// Absolute base used for external URLs through the serve endpoint.
    pub external_url: Option<String>,
    /// Keys shared by every manager.
    pub defaults: ManagerConfig,
    /// Managers by lower-cased name, each already merged over `defaults`.
    pub managers: BTreeMap<String, ManagerConfig>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            prefix: "/media".to_string(),
            external_url: None,
            defaults: ManagerConfig::default(),
            managers: BTreeMap::new(),
        }
    }
}

/// Settings for one manager and its storage backend.
///
/// Keys that only make sense for one manager or storage kind are optional;
/// their defaults are applied when the manager is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Manager kind: `file` or `image`.
    pub manager: String,
    /// Storage kind: `local` or `s3`.
    pub storage: String,
    /// Base URL that serves stored assets directly, bypassing the endpoint.
    pub url: Option<String>,
    /// Local root directory, or the object key prefix for `s3`.
    pub root: String,
    /// Allowed extensions and group names. Empty allows everything, except
    /// that image managers fall back to `IMAGES`.
    pub extensions: Vec<String>,
    pub public_view: bool,

    // local
    /// File mode for stored files (directories also get the execute bits).
    pub permission: Option<u32>,

    // image
    pub max_size: Option<Size>,
    pub thumbnail_size: Option<Size>,
    pub keep_image_formats: Option<Vec<String>>,
    pub image_quality: Option<u8>,
    pub crop_type: Option<CropAnchor>,
    pub preprocess: Option<TransformConfig>,
    pub postprocess: Option<TransformConfig>,

    // s3
    pub aws_access_key: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: Option<String>,
    /// Endpoint of an S3-compatible service.
    pub aws_endpoint: Option<String>,
    pub bucket_name: Option<String>,
    pub object_acl: Option<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            manager: "file".to_string(),
            storage: "local".to_string(),
            url: None,
            root: "media".to_string(),
            extensions: Vec::new(),
            public_view: true,
            permission: None,
            max_size: None,
            thumbnail_size: None,
            keep_image_formats: None,
            image_quality: None,
            crop_type: None,
            preprocess: None,
            postprocess: None,
            aws_access_key: None,
            aws_secret_access_key: None,
            aws_region: None,
            aws_endpoint: None,
            bucket_name: None,
            object_acl: None,
        }
    }
}

impl ManagerConfig {
    fn image_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.max_size.is_some() {
            keys.push("max_size");
        }
        if self.thumbnail_size.is_some() {
            keys.push("thumbnail_size");
        }
        if self.keep_image_formats.is_some() {
            keys.push("keep_image_formats");
        }
        if self.image_quality.is_some() {
            keys.push("image_quality");
        }
        if self.crop_type.is_some() {
            keys.push("crop_type");
        }
        if self.preprocess.is_some() {
            keys.push("preprocess");
        }
        if self.postprocess.is_some() {
            keys.push("postprocess");
        }
        keys
    }

    fn s3_keys(&self) -> Vec<&'static str> {
        [
            ("aws_access_key", self.aws_access_key.is_some()),
            ("aws_secret_access_key", self.aws_secret_access_key.is_some()),
            ("aws_region", self.aws_region.is_some()),
            ("aws_endpoint", self.aws_endpoint.is_some()),
            ("bucket_name", self.bucket_name.is_some()),
            ("object_acl", self.object_acl.is_some()),
        ]
        .into_iter()
        .filter_map(|(key, set)| set.then_some(key))
        .collect()
    }

    /// Validate one manager's values. `name` prefixes error messages.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::Validation(format!("managers.{name}: {msg}")));

        if self.manager == "file" {
            if let Some(key) = self.image_keys().first() {
                return fail(format!("{key} only applies to image managers"));
            }
        }
        if self.storage == "local" {
            if let Some(key) = self.s3_keys().first() {
                return fail(format!("{key} only applies to s3 storage"));
            }
        }
        if self.storage != "local" && self.permission.is_some() {
            return fail("permission only applies to local storage".into());
        }
        if self.storage == "s3" {
            if self.bucket_name.as_deref().is_none_or(str::is_empty) {
                return fail("bucket_name is required for s3 storage".into());
            }
            if self.aws_region.as_deref().is_none_or(str::is_empty) {
                return fail("aws_region is required for s3 storage".into());
            }
        }
        if let Some(q) = self.image_quality {
            if !(1..=100).contains(&q) {
                return fail("image_quality must be 1-100".into());
            }
        }
        for (key, size) in [("max_size", self.max_size), ("thumbnail_size", self.thumbnail_size)] {
            if size.is_some_and(Size::is_empty) {
                return fail(format!("{key} values must be non-zero"));
            }
        }
        if let Some(mode) = self.permission {
            if mode > 0o777 {
                return fail(format!("permission {mode:#o} is not a file mode"));
            }
        }
        for transform in [&self.preprocess, &self.postprocess].into_iter().flatten() {
            transform.validate().or_else(|msg| fail(msg))?;
        }
        Ok(())
    }
}

/// A configured `preprocess` / `postprocess` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum TransformConfig {
    Watermark {
        /// Path of the mark image.
        image: PathBuf,
        #[serde(default)]
        position: Position,
        #[serde(default = "default_opacity")]
        opacity: f32,
        #[serde(default)]
        tile: bool,
        #[serde(default)]
        scale: Scale,
        #[serde(default)]
        greyscale: bool,
        #[serde(default)]
        rotation: Rotation,
    },
}

fn default_opacity() -> f32 {
    Watermarker::DEFAULT_OPACITY
}

impl TransformConfig {
    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Watermark { opacity, .. } if !(0.0..=1.0).contains(opacity) => {
                Err("watermark opacity must be between 0 and 1".into())
            }
            Self::Watermark { .. } => Ok(()),
        }
    }

    /// Load whatever the transform needs and return it ready to apply.
    pub fn build(&self) -> crate::error::Result<Arc<dyn Transform>> {
        match self {
            Self::Watermark {
                image,
                position,
                opacity,
                tile,
                scale,
                greyscale,
                rotation,
            } => {
                let marker = Watermarker::open(image)?
                    .with_position(*position)
                    .with_opacity(*opacity)?
                    .with_tile(*tile)
                    .with_scale(*scale)
                    .with_greyscale(*greyscale)
                    .with_rotation(*rotation);
                Ok(Arc::new(marker))
            }
        }
    }
}

impl MediaConfig {
    /// Validate every manager and the route settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.prefix.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "prefix must start with '/', got {:?}",
                self.prefix
            )));
        }
        if let Some(url) = &self.external_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "external_url must be an absolute http(s) URL, got {url:?}"
                )));
            }
        }
        for (name, manager) in &self.managers {
            if name.is_empty() || name.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "invalid manager name {name:?}"
                )));
            }
            manager.validate(name)?;
        }
        Ok(())
    }
}

/// Serialize the stock defaults to a TOML value for merging.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(MediaConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, layer `[defaults]`
/// under every manager table, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<MediaConfig, ConfigError> {
    let mut overlay = match overlay {
        Some(toml::Value::Table(table)) => table,
        Some(_) => {
            return Err(ConfigError::Validation(
                "config root must be a table".into(),
            ));
        }
        None => toml::Table::new(),
    };
    let managers = match overlay.remove("managers") {
        Some(toml::Value::Table(table)) => table,
        Some(_) => {
            return Err(ConfigError::Validation(
                "managers must be a table of manager tables".into(),
            ));
        }
        None => toml::Table::new(),
    };

    let merged = merge_toml(stock_defaults_value()?, toml::Value::Table(overlay));
    let mut config: MediaConfig = merged.try_into()?;

    let defaults = toml::Value::try_from(&config.defaults)?;
    for (name, table) in managers {
        let name = name.to_lowercase();
        if config.managers.contains_key(&name) {
            return Err(ConfigError::Validation(format!(
                "manager {name:?} is defined twice (names are case-insensitive)"
            )));
        }
        let manager: ManagerConfig = merge_toml(defaults.clone(), table).try_into()?;
        config.managers.insert(name, manager);
    }
    if config.managers.is_empty() {
        config
            .managers
            .insert(DEFAULT_MANAGER_NAME.to_string(), config.defaults.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Load config from a `media.toml` file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the stock config.
pub fn load_config(path: &Path) -> Result<MediaConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Parse config from a TOML string (same layering as [`load_config`]).
pub fn parse_config(content: &str) -> Result<MediaConfig, ConfigError> {
    let value: toml::Value = toml::from_str(content)?;
    resolve_config(Some(value))
}

/// Returns a fully-commented stock `media.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Media Manager Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# [defaults] is merged under every [managers.<name>] table, so each manager
# only needs the keys it wants to override. Unknown keys will cause an error.

# Route prefix of the serve endpoint: assets are served at
# <prefix>/<manager>/<name>.
prefix = "/media"

# Absolute base for external URLs through the serve endpoint.
# external_url = "https://media.example.com"

[defaults]
# Manager kind: "file" stores bytes as uploaded, "image" decodes, resizes,
# thumbnails and re-encodes.
manager = "file"

# Storage kind: "local" (filesystem) or "s3" (object store).
storage = "local"

# Local storage directory, or the key prefix inside the bucket for s3.
root = "media"

# Allowed extensions. Group names expand: TEXT, DOCUMENTS, IMAGES, AUDIO,
# DATA, SCRIPTS, ARCHIVES, EXECUTABLES, DEFAULTS (TEXT+DOCUMENTS+IMAGES+DATA).
# Empty allows everything; image managers then default to IMAGES.
extensions = []

# Whether the serve endpoint may return assets from this storage.
public_view = true

# Base URL that serves the storage directly (skips the serve endpoint).
# url = "https://static.example.com/media/"

# ---------------------------------------------------------------------------
# Local storage
# ---------------------------------------------------------------------------
# File mode for stored files; directories also get the execute bits.
# permission = 0o644

# ---------------------------------------------------------------------------
# Image managers
# ---------------------------------------------------------------------------
# [managers.photos]
# manager = "image"
# max_size = [1600, 1600, false]         # [width, height, force crop]
# thumbnail_size = [200, 200, true]
# keep_image_formats = ["PNG", "JPG", "JPEG"]  # others are re-encoded as JPEG
# image_quality = 95                     # 1-100
# crop_type = "middle"                   # top, middle, bottom
#
# [managers.photos.postprocess]
# kind = "watermark"
# image = "watermark.png"
# position = "br"        # tl, tr, br, bl, c, r (random) or XxY ("10x20", "50%x90%")
# opacity = 0.5          # 0.0-1.0
# tile = false
# scale = 1.0            # factor, "F" (fit target) or "R" (relative)
# greyscale = false
# rotation = 0           # degrees counter-clockwise, or "r" (random)

# ---------------------------------------------------------------------------
# S3 storage
# ---------------------------------------------------------------------------
# [managers.uploads]
# storage = "s3"
# bucket_name = "my-bucket"              # created if missing
# aws_region = "eu-west-1"
# aws_access_key = "..."
# aws_secret_access_key = "..."
# aws_endpoint = "http://localhost:9000" # S3-compatible services
# object_acl = "public-read"
"##
}
