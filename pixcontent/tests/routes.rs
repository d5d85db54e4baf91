use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use pixcontent::routes::{ErrorResponse, GalleryStats, IMMUTABLE_CACHE_CONTROL, VERSION_HEADER};
use pixcontent::{Gallery, GalleryExt, GalleryState, create_gallery_router};
use pixserver::Server;
use pixthumbs::{ConverterOptions, PoolOptions, RenderPolicy, Thumbnails};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct Fixture {
    gallery_dir: TempDir,
    _cache_dir: TempDir,
    state: GalleryState,
}

fn write_png(path: &Path, width: u32, height: u32) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 4) as u8, (y * 8) as u8, 128])
    });
    img.save(path).unwrap();
}

fn fixture() -> Fixture {
    let gallery_dir = tempfile::tempdir().unwrap();
    write_png(&gallery_dir.path().join("photo.png"), 64, 32);
    std::fs::create_dir(gallery_dir.path().join("album")).unwrap();
    write_png(&gallery_dir.path().join("album").join("inner.png"), 16, 16);
    std::fs::write(gallery_dir.path().join(".hidden.jpg"), b"hidden").unwrap();
    std::fs::write(gallery_dir.path().join("notes.txt"), b"not a media").unwrap();

    let cache_dir = tempfile::tempdir().unwrap();
    let thumbnails = Thumbnails::with_media_converter(
        cache_dir.path(),
        ConverterOptions::default(),
        PoolOptions::default(),
        RenderPolicy::new([24, 48]).unwrap(),
    )
    .unwrap();

    let state = GalleryState {
        gallery: Arc::new(Gallery::new(gallery_dir.path()).unwrap()),
        thumbnails,
    };

    Fixture {
        gallery_dir,
        _cache_dir: cache_dir,
        state,
    }
}

async fn get(fixture: &Fixture, uri: &str) -> Response {
    create_gallery_router(fixture.state.clone())
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_root_listing_carries_version_header() {
    let fx = fixture();
    let response = get(&fx, "/content/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let header_version = response
        .headers()
        .get(VERSION_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let listing: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(listing["version"], header_version.as_str());
    assert_eq!(listing["directories"][0]["name"], "album");
    let media = listing["media"].as_array().unwrap();
    assert_eq!(media.len(), 1);
    assert_eq!(media[0]["name"], "photo.png");
    assert_eq!(media[0]["kind"], "photo");
}

#[tokio::test]
async fn test_sub_directory_listing() {
    let fx = fixture();
    let response = get(&fx, "/content/album").await;
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body_bytes(response).await;
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["path"], "album");
    assert_eq!(value["media"][0]["name"], "inner.png");
}

#[tokio::test]
async fn test_version_changes_when_directory_changes() {
    let fx = fixture();
    let before = get(&fx, "/content/album").await;
    let before = before.headers().get(VERSION_HEADER).unwrap().clone();

    write_png(&fx.gallery_dir.path().join("album").join("new.png"), 8, 8);

    let after = get(&fx, "/content/album").await;
    assert_ne!(after.headers().get(VERSION_HEADER).unwrap(), &before);
}

#[tokio::test]
async fn test_thumbnail_is_generated_and_immutable() {
    let fx = fixture();
    let response = get(&fx, "/content/photo.png/thumbnail/48").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/webp"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        IMMUTABLE_CACHE_CONTROL
    );

    let img = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert_eq!((img.width(), img.height()), (48, 24));
}

#[tokio::test]
async fn test_unlisted_thumbnail_size_uses_default() {
    let fx = fixture();
    let response = get(&fx, "/content/photo.png/thumbnail/1000").await;
    assert_eq!(response.status(), StatusCode::OK);

    let img = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert_eq!((img.width(), img.height()), (24, 12));
}

#[tokio::test]
async fn test_icon_is_served() {
    let fx = fixture();
    let response = get(&fx, "/content/album/inner.png/icon").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/webp"
    );
    assert!(!body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_original_file_is_streamed() {
    let fx = fixture();
    let response = get(&fx, "/content/photo.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
    assert!(response.headers().get(header::CACHE_CONTROL).is_none());

    let expected = std::fs::read(fx.gallery_dir.path().join("photo.png")).unwrap();
    assert_eq!(body_bytes(response).await, expected);
}

#[tokio::test]
async fn test_traversal_is_forbidden() {
    let fx = fixture();
    let response = get(&fx, "/content/album/../../etc/passwd").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body.error, "FORBIDDEN");
}

#[tokio::test]
async fn test_missing_and_unsupported_files_are_not_found() {
    let fx = fixture();
    for uri in [
        "/content/missing.jpg",
        "/content/missing.jpg/thumbnail",
        "/content/notes.txt",
        "/content/notes.txt/icon",
    ] {
        let response = get(&fx, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        let body: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body.error, "NOT_FOUND");
        assert!(!body.message.contains(uri));
    }
}

#[tokio::test]
async fn test_corrupt_photo_reports_conversion_failure() {
    let fx = fixture();
    std::fs::write(fx.gallery_dir.path().join("broken.jpg"), b"definitely not a jpeg").unwrap();

    let response = get(&fx, "/content/broken.jpg/thumbnail").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body.error, "CONVERSION_FAILED");
}

#[tokio::test]
async fn test_stats_reflect_generated_derivatives() {
    let fx = fixture();
    assert_eq!(
        get(&fx, "/content/photo.png/thumbnail").await.status(),
        StatusCode::OK
    );

    let response = get(&fx, "/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats: GalleryStats = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(stats.thumbnail_sizes, vec![24, 48]);
    assert_eq!(stats.cached_entries, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.active_jobs, 0);
}

#[tokio::test]
async fn test_server_extension_mounts_under_api_gallery() {
    let fx = fixture();
    let mut server = Server::new("Test", "127.0.0.1", 0);
    let gallery = Gallery::new(fx.gallery_dir.path()).unwrap();
    server
        .init_gallery(gallery, fx.state.thumbnails.clone())
        .await
        .unwrap();

    let router = server.router().await;
    let response = router
        .clone()
        .oneshot(
            Request::get("/api/gallery/content/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(listing["media"][0]["name"], "photo.png");

    let response = router
        .oneshot(
            Request::get("/api-docs/gallery.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
