//! Serve endpoint status mapping.

use http::StatusCode;
use http::header::{CONTENT_TYPE, LOCATION};
use media_manager::endpoint::{ServeRoute, handle, handle_path};
use media_manager::manager::Manager;
use media_manager::storage::{LocalStorage, RemoteOptions, RemoteStorage, StorageBackend};
use media_manager::{Registry, config};
use object_store::memory::InMemory;
use std::sync::Arc;
use tempfile::TempDir;

fn registry(tmp: &TempDir) -> Registry {
    let root = tmp.path().display().to_string();
    let media_config = config::parse_config(&format!(
        "[defaults]\nroot = {root:?}\n\
         [managers.public]\nroot = {:?}\n\
         [managers.private]\nroot = {:?}\npublic_view = false\n",
        format!("{root}/public"),
        format!("{root}/private"),
    ))
    .unwrap();
    Registry::from_config(&media_config).unwrap()
}

#[test]
fn existing_asset_is_served_with_mime() {
    let tmp = TempDir::new().unwrap();
    let registry = registry(&tmp);
    registry
        .get("public")
        .unwrap()
        .write("docs/readme.txt", "hello".into(), false)
        .unwrap();

    let response = handle(&registry, "public", "docs/readme.txt");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
    assert_eq!(response.body(), b"hello");

    let response = handle_path(&registry, "/media/public/docs/readme.txt");
    assert_eq!(response.status(), StatusCode::OK);
}

#[test]
fn missing_asset_or_manager_is_404() {
    let tmp = TempDir::new().unwrap();
    let registry = registry(&tmp);

    assert_eq!(handle(&registry, "public", "nope.txt").status(), StatusCode::NOT_FOUND);
    assert_eq!(handle(&registry, "unknown", "a.txt").status(), StatusCode::NOT_FOUND);
    assert_eq!(handle_path(&registry, "/elsewhere/public/a.txt").status(), StatusCode::NOT_FOUND);
    assert_eq!(handle_path(&registry, "/media/public").status(), StatusCode::NOT_FOUND);
}

#[test]
fn private_storage_is_a_bare_server_error() {
    let tmp = TempDir::new().unwrap();
    let registry = registry(&tmp);
    registry
        .get("private")
        .unwrap()
        .write("secret.txt", "classified".into(), false)
        .unwrap();

    let response = handle(&registry, "private", "secret.txt");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body().is_empty());
}

#[test]
fn object_store_assets_redirect() {
    let storage = RemoteStorage::with_store(
        Arc::new(InMemory::new()),
        RemoteOptions {
            prefix: Some("up".into()),
            base_url: Some("https://bucket.example.com/".into()),
            ..Default::default()
        },
    )
    .unwrap();
    storage.write("a.png", "x".into()).unwrap();

    let mut registry = Registry::new(ServeRoute::default());
    registry.insert(Manager::file("cloud", Box::new(storage))).unwrap();

    let response = handle(&registry, "cloud", "a.png");
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[LOCATION], "https://bucket.example.com/up/a.png");
}

#[tokio::test(flavor = "multi_thread")]
async fn object_store_assets_are_served_from_async_handlers() {
    let storage = RemoteStorage::with_store(
        Arc::new(InMemory::new()),
        RemoteOptions {
            base_url: Some("https://bucket.example.com".into()),
            ..Default::default()
        },
    )
    .unwrap();
    storage.write("a.png", "x".into()).unwrap();

    let mut registry = Registry::new(ServeRoute::default());
    registry.insert(Manager::file("cloud", Box::new(storage))).unwrap();

    let response = handle(&registry, "cloud", "a.png");
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(handle(&registry, "cloud", "gone.png").status(), StatusCode::NOT_FOUND);
    drop(registry);
}

#[test]
fn sole_manager_is_selected_by_empty_name() {
    let tmp = TempDir::new().unwrap();
    let storage = LocalStorage::new(tmp.path()).unwrap();
    storage.write("only.txt", "x".into()).unwrap();

    let mut registry = Registry::new(ServeRoute::new("/files", None));
    registry.insert(Manager::file("only", Box::new(storage))).unwrap();

    assert_eq!(handle(&registry, "", "only.txt").status(), StatusCode::OK);
    assert_eq!(handle_path(&registry, "/files/only/only.txt").status(), StatusCode::OK);
}
