//! End-to-end image manager behaviour: configuration → registry → save →
//! stored bytes, on both backends.

use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use media_manager::imaging::{self, Quality, Size};
use media_manager::manager::{Asset, ImageStrategy, Manager, SaveOptions};
use media_manager::storage::{RemoteOptions, RemoteStorage};
use media_manager::{MediaError, Registry, config};
use object_store::memory::InMemory;
use std::sync::Arc;
use tempfile::TempDir;

fn photo(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 200) as u8, (y % 200) as u8, 255])
    }));
    imaging::encode(&image, format, Quality::default()).unwrap()
}

fn registry(tmp: &TempDir, managers: &str) -> Registry {
    let root = tmp.path().join("media").display().to_string();
    let media_config = config::parse_config(&format!(
        "external_url = \"https://example.com\"\n[defaults]\nroot = {root:?}\n{managers}"
    ))
    .unwrap();
    Registry::from_config(&media_config).unwrap()
}

fn keep_name() -> SaveOptions {
    SaveOptions::default().generate_name(false)
}

#[test]
fn configured_image_manager_resizes_and_thumbnails() {
    let tmp = TempDir::new().unwrap();
    let registry = registry(
        &tmp,
        "[managers.photos]\nmanager = \"image\"\nmax_size = [400, 400, false]\nthumbnail_size = [64, 48, true]\n",
    );
    let photos = registry.get("photos").unwrap();

    let name = photos
        .save(Asset::upload("Beach.PNG", photo(1600, 1200, ImageFormat::Png)), None, keep_name())
        .unwrap();
    assert_eq!(name, "Beach.png");

    let main = imaging::decode(&photos.read("Beach.png").unwrap()).unwrap();
    assert_eq!(main.dimensions(), (400, 300));
    assert_eq!(main.format, Some(ImageFormat::Png));

    let thumb_name = photos.thumbnail_name("Beach.png").unwrap();
    assert_eq!(thumb_name, "Beach_thumb.png");
    let thumb = imaging::decode(&photos.read(&thumb_name).unwrap()).unwrap();
    assert_eq!(thumb.dimensions(), (64, 48));

    assert_eq!(
        photos.thumbnail_url("Beach.png", true).unwrap(),
        "https://example.com/media/photos/Beach_thumb.png"
    );
}

#[test]
fn png_is_reencoded_when_not_kept() {
    let tmp = TempDir::new().unwrap();
    let registry = registry(
        &tmp,
        "[managers.photos]\nmanager = \"image\"\nkeep_image_formats = [\"JPG\"]\n",
    );
    let photos = registry.get("photos").unwrap();

    // PNG is no longer kept, so it is re-encoded as JPEG
    let name = photos
        .save(Asset::upload("chart.png", photo(50, 50, ImageFormat::Png)), None, keep_name())
        .unwrap();
    assert_eq!(name, "chart.jpg");
    assert!(photos.exists("chart_thumb.jpg").unwrap());
    let stored = imaging::decode(&photos.read("chart.jpg").unwrap()).unwrap();
    assert_eq!(stored.format, Some(ImageFormat::Jpeg));
}

#[test]
fn image_manager_rejects_non_images() {
    let tmp = TempDir::new().unwrap();
    let registry = registry(&tmp, "[managers.photos]\nmanager = \"image\"\n");
    let photos = registry.get("photos").unwrap();

    let err = photos
        .save(Asset::upload("notes.txt", "plain text"), None, keep_name())
        .unwrap_err();
    assert!(matches!(err, MediaError::InvalidArgument(_)));
}

#[test]
fn generated_names_carry_the_original() {
    let tmp = TempDir::new().unwrap();
    let registry = registry(&tmp, "[managers.photos]\nmanager = \"image\"\n");
    let photos = registry.get("photos").unwrap();

    let first = photos
        .save(Asset::upload("same.jpg", photo(20, 20, ImageFormat::Jpeg)), None, SaveOptions::default())
        .unwrap();
    let second = photos
        .save(Asset::upload("same.jpg", photo(20, 20, ImageFormat::Jpeg)), None, SaveOptions::default())
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(photos.original_name(&first), Some("same.jpg"));
    assert!(photos.exists(&photos.thumbnail_name(&second).unwrap()).unwrap());
}

#[test]
fn configured_watermark_marks_main_image_only() {
    let tmp = TempDir::new().unwrap();
    let mark_path = tmp.path().join("mark.png");
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([255, 0, 0, 255])))
        .save(&mark_path)
        .unwrap();

    let registry = registry(
        &tmp,
        &format!(
            "[managers.photos]\nmanager = \"image\"\nthumbnail_size = [100, 100, true]\n\
             [managers.photos.postprocess]\nkind = \"watermark\"\nimage = {:?}\n\
             position = \"c\"\nopacity = 1.0\n",
            mark_path.display().to_string()
        ),
    );
    let photos = registry.get("photos").unwrap();
    photos
        .save(Asset::upload("marked.png", photo(200, 100, ImageFormat::Png)), None, keep_name())
        .unwrap();

    let main = imaging::decode(&photos.read("marked.png").unwrap()).unwrap();
    // 20x20 mark centered on 200x100 covers 90..110 x 40..60
    assert_eq!(main.image.get_pixel(100, 50), Rgba([255, 0, 0, 255]));
    assert_eq!(main.image.get_pixel(10, 10).0[2], 255);

    let thumb = imaging::decode(&photos.read("marked_thumb.png").unwrap()).unwrap();
    assert_ne!(thumb.image.get_pixel(50, 50), Rgba([255, 0, 0, 255]));
}

#[test]
fn missing_watermark_image_fails_registry_build() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().display().to_string();
    let media_config = config::parse_config(&format!(
        "[defaults]\nroot = {root:?}\n[managers.p]\nmanager = \"image\"\n\
         [managers.p.postprocess]\nkind = \"watermark\"\nimage = \"/nonexistent/mark.png\"\n"
    ))
    .unwrap();
    let err = Registry::from_config(&media_config).unwrap_err();
    assert!(matches!(err, MediaError::InvalidArgument(ref m) if m.contains("watermark")));
}

#[test]
fn delete_removes_image_and_thumbnail() {
    let tmp = TempDir::new().unwrap();
    let registry = registry(&tmp, "[managers.photos]\nmanager = \"image\"\n");
    let photos = registry.get("photos").unwrap();
    photos
        .save(Asset::upload("bye.png", photo(300, 300, ImageFormat::Png)), None, keep_name())
        .unwrap();
    assert!(photos.exists("bye_thumb.png").unwrap());

    photos.delete("bye.png").unwrap();
    assert!(!photos.exists("bye.png").unwrap());
    assert!(!photos.exists("bye_thumb.png").unwrap());
}

#[test]
fn image_manager_on_object_store() {
    let storage = RemoteStorage::with_store(
        Arc::new(InMemory::new()),
        RemoteOptions {
            prefix: Some("photos".into()),
            base_url: Some("https://bucket.example.com".into()),
            ..Default::default()
        },
    )
    .unwrap();
    let strategy = ImageStrategy::default().with_thumbnail_size(Some(Size::new(32, 32, true)));
    let photos = Manager::image("photos", Box::new(storage), strategy);

    let name = photos
        .save(Asset::upload("cloud.jpg", photo(128, 64, ImageFormat::Jpeg)), None, keep_name())
        .unwrap();
    assert_eq!(name, "cloud.jpg");
    let thumb = imaging::decode(&photos.read("cloud_thumb.jpg").unwrap()).unwrap();
    assert_eq!(thumb.dimensions(), (32, 32));

    // object stores hand out direct URLs
    assert_eq!(
        photos.url("cloud.jpg", false).unwrap(),
        "https://bucket.example.com/photos/cloud.jpg"
    );

    // thumbnail already gone: delete still succeeds
    photos.storage().delete("cloud_thumb.jpg").unwrap();
    photos.delete("cloud.jpg").unwrap();
    assert!(!photos.exists("cloud.jpg").unwrap());
}
