//! Plugin kinds and the named-manager registry.
//!
//! [`Plugins`] maps the kind names used in configuration (`storage = "s3"`,
//! `manager = "image"`) to constructors. The built-in kinds are registered by
//! [`Plugins::default`]; callers can add their own before building.
//!
//! [`Registry`] owns the built managers, keyed by lower-cased name. It is
//! built once from a [`MediaConfig`] and passed to whatever needs it.

use crate::config::{ConfigError, ManagerConfig, MediaConfig};
use crate::endpoint::ServeRoute;
use crate::error::{MediaError, Result};
use crate::extensions::AllowedExtensions;
use crate::imaging::{Quality, Transform};
use crate::manager::{DEFAULT_THUMBNAIL_SIZE, ImageStrategy, Manager};
use crate::storage::local::DEFAULT_PERMISSION;
use crate::storage::{LocalStorage, RemoteOptions, RemoteStorage, S3Settings, StorageBackend};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Builds a storage backend from a manager's config.
pub type StorageFactory = fn(&ManagerConfig) -> Result<Box<dyn StorageBackend>>;

/// Builds a manager around an already built backend.
pub type ManagerFactory = fn(&str, Box<dyn StorageBackend>, &ManagerConfig) -> Result<Manager>;

#[derive(Clone)]
pub struct Plugins {
    storages: BTreeMap<String, StorageFactory>,
    managers: BTreeMap<String, ManagerFactory>,
}

impl Default for Plugins {
    fn default() -> Self {
        let mut plugins = Self::empty();
        plugins.register_storage("local", local_storage);
        plugins.register_storage("s3", s3_storage);
        plugins.register_manager("file", file_manager);
        plugins.register_manager("image", image_manager);
        plugins
    }
}

impl std::fmt::Debug for Plugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugins")
            .field("storages", &self.storages.keys().collect::<Vec<_>>())
            .field("managers", &self.managers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Plugins {
    /// No kinds at all.
    pub fn empty() -> Self {
        Self {
            storages: BTreeMap::new(),
            managers: BTreeMap::new(),
        }
    }

    /// Register (or replace) a storage kind. Kind names are case-insensitive.
    pub fn register_storage(&mut self, kind: &str, factory: StorageFactory) {
        self.storages.insert(kind.to_lowercase(), factory);
    }

    pub fn register_manager(&mut self, kind: &str, factory: ManagerFactory) {
        self.managers.insert(kind.to_lowercase(), factory);
    }

    pub fn storage_kinds(&self) -> impl Iterator<Item = &str> {
        self.storages.keys().map(String::as_str)
    }

    pub fn manager_kinds(&self) -> impl Iterator<Item = &str> {
        self.managers.keys().map(String::as_str)
    }

    /// Build one manager and its backend.
    pub fn build_manager(&self, name: &str, config: &ManagerConfig) -> Result<Manager> {
        let storage_factory = self
            .storages
            .get(&config.storage.to_lowercase())
            .ok_or_else(|| unknown_kind(name, "storage", &config.storage))?;
        let manager_factory = self
            .managers
            .get(&config.manager.to_lowercase())
            .ok_or_else(|| unknown_kind(name, "manager", &config.manager))?;

        let storage = storage_factory(config)?;
        manager_factory(name, storage, config)
    }

    /// Build every manager in `config`.
    pub fn build(&self, config: &MediaConfig) -> Result<Registry> {
        let route = ServeRoute::new(config.prefix.as_str(), config.external_url.clone());
        let mut registry = Registry::new(route.clone());
        for (name, manager_config) in &config.managers {
            let manager = self.build_manager(name, manager_config)?.with_route(route.clone());
            info!(
                manager = %name,
                kind = manager.kind(),
                storage = manager.storage().kind(),
                "Registered manager"
            );
            registry.insert(manager)?;
        }
        Ok(registry)
    }
}

fn unknown_kind(name: &str, what: &str, kind: &str) -> MediaError {
    MediaError::Config(ConfigError::Validation(format!(
        "managers.{name}: unknown {what} kind {kind:?}"
    )))
}

fn local_storage(config: &ManagerConfig) -> Result<Box<dyn StorageBackend>> {
    let permission = config.permission.unwrap_or(DEFAULT_PERMISSION);
    let storage = LocalStorage::open(config.root.as_str(), permission)?
        .with_public_view(config.public_view)
        .with_base_url(config.url.clone());
    Ok(Box::new(storage))
}

fn s3_storage(config: &ManagerConfig) -> Result<Box<dyn StorageBackend>> {
    let settings = S3Settings {
        bucket: config.bucket_name.clone().unwrap_or_default(),
        region: config.aws_region.clone().unwrap_or_default(),
        access_key: config.aws_access_key.clone(),
        secret_key: config.aws_secret_access_key.clone(),
        endpoint: config.aws_endpoint.clone(),
        acl: config.object_acl.clone(),
    };
    let options = RemoteOptions {
        prefix: Some(config.root.clone()),
        public_view: config.public_view,
        base_url: config.url.clone(),
    };
    Ok(Box::new(RemoteStorage::s3(&settings, options)?))
}

fn file_manager(
    name: &str,
    storage: Box<dyn StorageBackend>,
    config: &ManagerConfig,
) -> Result<Manager> {
    Ok(Manager::file(name, storage)
        .with_extensions(AllowedExtensions::from_entries(&config.extensions)))
}

fn image_manager(
    name: &str,
    storage: Box<dyn StorageBackend>,
    config: &ManagerConfig,
) -> Result<Manager> {
    let build = |t: &Option<crate::config::TransformConfig>| -> Result<Option<Arc<dyn Transform>>> {
        t.as_ref().map(|t| t.build()).transpose()
    };

    let mut strategy = ImageStrategy::default()
        .with_max_size(config.max_size)
        .with_thumbnail_size(Some(config.thumbnail_size.unwrap_or(DEFAULT_THUMBNAIL_SIZE)))
        .with_quality(config.image_quality.map(Quality::new).unwrap_or_default())
        .with_crop(config.crop_type.unwrap_or_default())
        .with_preprocess(build(&config.preprocess)?)
        .with_postprocess(build(&config.postprocess)?);
    if let Some(formats) = &config.keep_image_formats {
        strategy = strategy.with_keep_formats(formats.clone());
    }

    let manager = Manager::image(name, storage, strategy);
    Ok(if config.extensions.is_empty() {
        manager
    } else {
        manager.with_extensions(AllowedExtensions::from_entries(&config.extensions))
    })
}

/// Managers by name.
#[derive(Debug)]
pub struct Registry {
    managers: BTreeMap<String, Manager>,
    route: ServeRoute,
}

impl Registry {
    pub fn new(route: ServeRoute) -> Self {
        Self {
            managers: BTreeMap::new(),
            route,
        }
    }

    /// Build with the built-in plugin kinds.
    pub fn from_config(config: &MediaConfig) -> Result<Self> {
        Plugins::default().build(config)
    }

    /// Add a manager. Names must be unique.
    pub fn insert(&mut self, manager: Manager) -> Result<()> {
        let name = manager.name().to_string();
        if self.managers.contains_key(&name) {
            return Err(MediaError::AlreadyExists(format!("manager {name}")));
        }
        self.managers.insert(name, manager);
        Ok(())
    }

    /// Look up a manager by name, case-insensitively. An empty name selects
    /// the only manager when exactly one is registered.
    pub fn get(&self, name: &str) -> Result<&Manager> {
        if name.is_empty() {
            let mut all = self.managers.values();
            return match (all.next(), all.next()) {
                (Some(only), None) => Ok(only),
                _ => Err(MediaError::NotFound(
                    "manager name required when several managers are configured".into(),
                )),
            };
        }
        self.managers
            .get(&name.to_lowercase())
            .ok_or_else(|| MediaError::NotFound(format!("manager {name}")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.managers.keys().map(String::as_str)
    }

    pub fn route(&self) -> &ServeRoute {
        &self.route
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}
