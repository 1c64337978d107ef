//! # Media Manager
//!
//! Pluggable media storage. Client code saves an uploaded asset under a
//! logical name and later reads, serves, lists, archives or deletes it,
//! without knowing whether the bytes live on the local filesystem or in an
//! object store.
//!
//! # Architecture
//!
//! ```text
//! Registry ── name ──▶ Manager ──▶ SaveStrategy (file | image) ──▶ StorageBackend (local | s3)
//!                         │                  │
//!                         │                  └── imaging: resize, thumbnail, watermark, encode
//!                         └── ServeRoute ──▶ endpoint::handle → 200 / 302 / 404 / 500
//! ```
//!
//! A [`manager::Manager`] composes exactly one backend with an extension
//! allow-list, a name generator and a save strategy. File managers store bytes
//! as uploaded; image managers decode, resize, store a thumbnail companion,
//! optionally watermark, and re-encode. Companions are found again by name
//! derivation alone (`photo.jpg` → `photo_thumb.jpg`); there is no index.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`error`] | `MediaError` taxonomy shared by every layer |
//! | [`naming`] | Unique names, companion names, filename sanitising |
//! | [`extensions`] | Named extension groups and the allow-list policy |
//! | [`storage`] | The `StorageBackend` contract, local and object-store backends, zip archives |
//! | [`imaging`] | Pure-Rust image operations: resize, crop, color normalization, watermark |
//! | [`manager`] | `Manager` plus the file and image save strategies |
//! | [`config`] | `media.toml` loading, layering, validation |
//! | [`registry`] | Plugin kinds and the named-manager registry |
//! | [`endpoint`] | Framework-independent serve route |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Synchronous Contract
//!
//! The storage contract is synchronous (`&self`, `Send + Sync`). The object
//! store backend owns a small tokio runtime and blocks on it. Inside a
//! multi-threaded runtime the wait goes through `block_in_place`; inside a
//! current-thread runtime it moves to a scoped thread.
//!
//! ## Non-Atomic Saves
//!
//! A non-overwrite save checks for an existing name and then writes. Two
//! concurrent saves of the same name can both pass the check; the last write
//! wins. An image save stores its thumbnail before the main image and is not
//! rolled back if a later step fails.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod extensions;
pub mod imaging;
pub mod manager;
pub mod naming;
pub mod output;
pub mod registry;
pub mod storage;

pub use error::{MediaError, Result};
pub use manager::{Asset, Manager, SaveOptions};
pub use registry::Registry;
pub use storage::StorageBackend;
