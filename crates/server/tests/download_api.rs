//! In-process tests for the batch download route.

mod common;

use std::io::{Cursor, Read};

use axum::http::{header, StatusCode};
use common::TestFixture;
use serde_json::json;

fn read_archive(bytes: Vec<u8>) -> zip::ZipArchive<Cursor<Vec<u8>>> {
    zip::ZipArchive::new(Cursor::new(bytes)).expect("response is not a zip archive")
}

#[tokio::test]
async fn test_download_batch_zips_requested_outputs() {
    let fixture = TestFixture::new().await;
    std::fs::write(fixture.output_dir.join("1-cat.png"), b"png data").unwrap();
    std::fs::write(fixture.output_dir.join("1-cat.webp"), b"webp data").unwrap();

    let (status, headers, body) = fixture
        .post_json_raw(
            "/api/download-batch",
            &json!({"files": [
                {"url": "/output/1-cat.png", "name": "cat.png"},
                {"url": "/output/1-cat.webp"},
                {"url": "/output/expired.webm", "name": "old.webm"},
            ]}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"stickers-"));

    let mut archive = read_archive(body);
    assert_eq!(archive.len(), 2);
    let mut contents = String::new();
    archive
        .by_name("cat.png")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "png data");
    assert!(archive.by_name("1-cat.webp").is_ok());
    // Archiving leaves the outputs in place.
    assert_eq!(fixture.output_count(), 2);
}

#[tokio::test]
async fn test_download_batch_renames_duplicate_entries() {
    let fixture = TestFixture::new().await;
    std::fs::write(fixture.output_dir.join("a.png"), b"a").unwrap();
    std::fs::write(fixture.output_dir.join("b.png"), b"b").unwrap();

    let (status, _, body) = fixture
        .post_json_raw(
            "/api/download-batch",
            &json!({"files": [
                {"url": "/output/a.png", "name": "sticker.png"},
                {"url": "/output/b.png", "name": "sticker.png"},
            ]}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let archive = read_archive(body);
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort();
    assert_eq!(names, vec!["2-sticker.png", "sticker.png"]);
}

#[tokio::test]
async fn test_download_batch_rejects_paths_outside_output() {
    let fixture = TestFixture::new().await;
    std::fs::write(fixture.output_dir.join("ok.png"), b"ok").unwrap();
    std::fs::write(fixture.temp_dir.path().join("secret.toml"), b"key = 1").unwrap();
    std::fs::write(fixture.uploads_dir.join("upload.mp4"), b"raw").unwrap();

    for url in [
        "/output/../secret.toml",
        "/output/..%2Fsecret.toml/../../secret.toml",
        "/uploads/upload.mp4",
        "/etc/passwd",
    ] {
        let response = fixture
            .post_json(
                "/api/download-batch",
                &json!({"files": [{"url": "/output/ok.png"}, {"url": url}]}),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "url: {}", url);
        assert!(response.body["error"].as_str().unwrap().contains("Invalid file URL"));
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_download_batch_rejects_symlink_escape() {
    let fixture = TestFixture::new().await;
    let secret = fixture.temp_dir.path().join("secret.toml");
    std::fs::write(&secret, b"key = 1").unwrap();
    std::os::unix::fs::symlink(&secret, fixture.output_dir.join("link.png")).unwrap();

    let response = fixture
        .post_json("/api/download-batch", &json!({"files": [{"url": "/output/link.png"}]}))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_batch_requires_files() {
    let fixture = TestFixture::new().await;

    for body in [json!({"files": []}), json!({})] {
        let response = fixture.post_json("/api/download-batch", &body).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["error"], "No files requested");
    }
}

#[tokio::test]
async fn test_download_batch_all_missing_is_404() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_json(
            "/api/download-batch",
            &json!({"files": [{"url": "/output/gone.png"}]}),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
