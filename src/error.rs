//! Error taxonomy shared by storages, managers and the transform engine.
//!
//! | Variant | Raised when |
//! |---|---|
//! | [`MediaError::NotFound`] | the asset is absent on read/serve/delete |
//! | [`MediaError::AlreadyExists`] | a non-overwrite write collides with an existing name |
//! | [`MediaError::InvalidArgument`] | bad or missing filename, disallowed extension, malformed image or parameter |
//! | [`MediaError::Unsupported`] | the backend does not implement the operation |
//! | [`MediaError::Forbidden`] | serving was attempted on a non-public backend |
//! | [`MediaError::Backend`] | an underlying I/O, network or codec failure |
//! | [`MediaError::Config`] | configuration could not be loaded or validated |

use crate::config::ConfigError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MediaError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Asset not found: {0}")]
    NotFound(String),
    #[error("Asset already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Operation not supported by this storage: {0}")]
    Unsupported(&'static str),
    #[error("Serving is disabled for this storage: {0}")]
    Forbidden(String),
    #[error("Storage backend error: {context}")]
    Backend {
        context: String,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MediaError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn backend(
        context: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Map an I/O error on `name`: a missing file becomes [`MediaError::NotFound`],
    /// anything else is a backend failure.
    pub fn io(name: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(name.to_string())
        } else {
            Self::backend(format!("I/O failure on {name}"), err)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<image::ImageError> for MediaError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Decoding(_) | image::ImageError::Unsupported(_) => {
                Self::InvalidArgument(format!("invalid image: {err}"))
            }
            other => Self::backend("image codec failure", other),
        }
    }
}

impl From<zip::result::ZipError> for MediaError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::backend("zip archive failure", err)
    }
}
