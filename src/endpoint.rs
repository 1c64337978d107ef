//! Serve endpoint, independent of any web framework.
//!
//! Assets of managers without a direct base URL are reachable at
//! `{prefix}/{manager}/{name}`. [`ServeRoute`] builds those URLs and parses
//! them back; [`handle`] turns a request into an `http::Response` that a web
//! framework can forward as is.
//!
//! | Outcome | Status |
//! |---|---|
//! | content | 200 with `Content-Type` |
//! | redirect (object stores) | 302 with `Location` |
//! | unknown manager or asset | 404 |
//! | anything else | 500, empty body |
//!
//! Server errors are logged with their cause and returned without detail.

use crate::error::{MediaError, Result};
use crate::registry::Registry;
use crate::storage::{DEFAULT_MIME, Served};
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, Response, StatusCode};
use tracing::{debug, error};

pub type ServeResponse = Response<Vec<u8>>;

pub const DEFAULT_PREFIX: &str = "/media";

/// Where the serve endpoint is mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeRoute {
    prefix: String,
    external_url: Option<String>,
}

impl Default for ServeRoute {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, None)
    }
}

impl ServeRoute {
    pub fn new(prefix: impl Into<String>, external_url: Option<String>) -> Self {
        let prefix = prefix.into();
        let prefix = format!("/{}", prefix.trim_matches('/'));
        Self {
            prefix,
            external_url: external_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Route URL of `name` under `manager`. `external` prepends the configured
    /// absolute base.
    pub fn url(&self, manager: &str, name: &str, external: bool) -> Result<String> {
        let path = format!(
            "{}/{}/{}",
            self.prefix.trim_end_matches('/'),
            manager,
            name.trim_start_matches('/')
        );
        if !external {
            return Ok(path);
        }
        let base = self
            .external_url
            .as_deref()
            .ok_or_else(|| MediaError::invalid("external URLs need an external_url"))?;
        Ok(format!("{base}{path}"))
    }

    /// Split a request path into `(manager, name)`.
    pub fn parse<'a>(&self, path: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = path.strip_prefix(self.prefix.trim_end_matches('/'))?;
        let rest = rest.strip_prefix('/')?;
        rest.split_once('/')
            .filter(|(manager, name)| !manager.is_empty() && !name.is_empty())
    }
}

/// Serve `name` from the manager called `manager`.
pub fn handle(registry: &Registry, manager: &str, name: &str) -> ServeResponse {
    let served = registry.get(manager).and_then(|m| m.serve(name));
    match served {
        Ok(Served::Content { body, mime }) => {
            debug!(manager, name, bytes = body.len(), "Serving asset");
            let content_type = HeaderValue::from_str(&mime)
                .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME));
            let mut response = Response::new(body);
            response.headers_mut().insert(CONTENT_TYPE, content_type);
            response
        }
        Ok(Served::Redirect(url)) => match HeaderValue::from_str(&url) {
            Ok(location) => {
                debug!(manager, name, %url, "Redirecting to asset");
                let mut response = status(StatusCode::FOUND);
                response.headers_mut().insert(LOCATION, location);
                response
            }
            Err(e) => {
                error!(manager, name, error = %e, "Invalid redirect location");
                status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        },
        Err(e) if e.is_not_found() => status(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(manager, name, error = %e, "Failed to serve asset");
            status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Serve a full request path such as `/media/photos/a.jpg`.
pub fn handle_path(registry: &Registry, path: &str) -> ServeResponse {
    match registry.route().parse(path) {
        Some((manager, name)) => handle(registry, manager, name),
        None => status(StatusCode::NOT_FOUND),
    }
}

fn status(code: StatusCode) -> ServeResponse {
    let mut response = Response::new(Vec::new());
    *response.status_mut() = code;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_route_url() {
        let route = ServeRoute::default();
        assert_eq!(route.url("files", "a/b.txt", false).unwrap(), "/media/files/a/b.txt");
    }

    #[test]
    fn external_url_needs_base() {
        let route = ServeRoute::default();
        assert!(matches!(
            route.url("files", "a.txt", true),
            Err(MediaError::InvalidArgument(_))
        ));

        let route = ServeRoute::new("/media/", Some("https://cdn.example.com/".into()));
        assert_eq!(
            route.url("files", "a.txt", true).unwrap(),
            "https://cdn.example.com/media/files/a.txt"
        );
    }

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(ServeRoute::new("assets/", None).prefix(), "/assets");
        assert_eq!(ServeRoute::new("/", None).prefix(), "/");
        assert_eq!(ServeRoute::new("/", None).url("m", "x", false).unwrap(), "/m/x");
    }

    #[test]
    fn parse_splits_manager_and_name() {
        let route = ServeRoute::default();
        assert_eq!(route.parse("/media/photos/a/b.jpg"), Some(("photos", "a/b.jpg")));
        assert_eq!(route.parse("/media/photos/"), None);
        assert_eq!(route.parse("/media/photos"), None);
        assert_eq!(route.parse("/other/photos/a.jpg"), None);
        assert_eq!(route.parse("/mediax/photos/a.jpg"), None);
    }

    #[test]
    fn parse_under_root_prefix() {
        let route = ServeRoute::new("/", None);
        assert_eq!(route.parse("/files/x.txt"), Some(("files", "x.txt")));
    }
}
