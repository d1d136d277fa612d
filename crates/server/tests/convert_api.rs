//! In-process tests for the upload-and-convert routes.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{fixtures, Part, TestFixture};
use stickerkit_core::ConverterError;

const IMAGE_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0, 1, 2, 3, 4, 5, 6, 7];
const VIDEO_BYTES: &[u8] = &[0u8; 4096];

fn image_part(content_type: &'static str) -> Part<'static> {
    Part::File {
        name: "image",
        filename: "cat photo.png",
        content_type,
        data: IMAGE_BYTES,
    }
}

fn video_part() -> Part<'static> {
    Part::File {
        name: "video",
        filename: "clip.mp4",
        content_type: "video/mp4",
        data: VIDEO_BYTES,
    }
}

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert!(response.body["timestamp"].is_string());
    assert_eq!(response.body["processor"]["activeJobs"], 0);
}

#[tokio::test]
async fn test_config_exposes_public_limits_only() {
    let fixture = TestFixture::with_config(|config| {
        config.sticker.max_size = 256;
    })
    .await;

    let response = fixture.get("/api/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["sticker"]["maxSize"], 256);
    assert_eq!(response.body["sticker"]["maxVideoDuration"], 3.0);
    assert!(response.body.get("paths").is_none());
}

#[tokio::test]
async fn test_convert_image_success() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_multipart(
            "/api/convert-image",
            &[image_part("image/png"), Part::Text("taskId", "img-1")],
        )
        .await;

    assert_eq!(response.status, StatusCode::OK, "body: {}", response.body);
    let body = &response.body;
    assert_eq!(body["success"], true);
    assert_eq!(body["taskId"], "img-1");
    assert_eq!(body["original"]["width"], 800);
    assert_eq!(body["original"]["height"], 600);
    assert_eq!(body["original"]["size"], IMAGE_BYTES.len());
    assert_eq!(body["result"]["width"], 512);
    assert_eq!(body["result"]["height"], 384);

    let png = &body["result"]["png"];
    let png_name = png["filename"].as_str().unwrap();
    assert!(png_name.starts_with("cat_photo-"));
    assert!(png_name.ends_with(".png"));
    assert_eq!(png["url"], format!("/output/{}", png_name));
    assert_eq!(png["size"], 2048);
    assert_eq!(body["result"]["webp"]["size"], 1024);

    // Input is reaped, outputs are kept
    fixture.wait_for_reaper().await;
    assert_eq!(fixture.upload_count(), 0);
    assert_eq!(fixture.output_count(), 2);
}

#[tokio::test]
async fn test_convert_image_without_task_id() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_multipart("/api/convert-image", &[image_part("image/png")])
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["taskId"].is_null());
}

#[tokio::test]
async fn test_convert_image_missing_file() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_multipart("/api/convert-image", &[Part::Text("taskId", "img-2")])
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "No image file uploaded");
    assert!(fixture.image_encoder.recorded_requests().await.is_empty());
}

#[tokio::test]
async fn test_convert_image_rejects_mime_type() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_multipart("/api/convert-image", &[image_part("text/plain")])
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("Unsupported file type"));
    assert_eq!(fixture.upload_count(), 0);
}

#[tokio::test]
async fn test_rejects_oversized_upload() {
    let fixture = TestFixture::with_config(|config| {
        config.upload.max_file_size = 1024;
    })
    .await;

    let response = fixture
        .post_multipart(
            "/api/convert-video",
            &[Part::File {
                name: "video",
                filename: "big.mp4",
                content_type: "video/mp4",
                data: &[0u8; 4096],
            }],
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "File too large");

    fixture.wait_for_reaper().await;
    assert_eq!(fixture.upload_count(), 0);
}

#[tokio::test]
async fn test_convert_image_encode_failure_is_500() {
    let fixture = TestFixture::new().await;
    fixture
        .image_encoder
        .set_encode_error(ConverterError::encode_failed("out of memory"))
        .await;

    let response = fixture
        .post_multipart("/api/convert-image", &[image_part("image/png")])
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("Failed to encode image"));

    fixture.wait_for_reaper().await;
    assert_eq!(fixture.upload_count(), 0);
    assert_eq!(fixture.output_count(), 0);
}

#[tokio::test]
async fn test_convert_video_success() {
    let fixture = TestFixture::new().await;
    fixture
        .transcoder
        .set_default_probe(fixtures::video_asset(1920, 1080, 8.0))
        .await;

    let response = fixture
        .post_multipart(
            "/api/convert-video",
            &[
                video_part(),
                Part::Text("taskId", "vid-1"),
                Part::Text("startTime", "0.5"),
                Part::Text("endTime", "2"),
            ],
        )
        .await;

    assert_eq!(response.status, StatusCode::OK, "body: {}", response.body);
    let body = &response.body;
    assert_eq!(body["taskId"], "vid-1");
    assert_eq!(body["original"]["width"], 1920);
    assert_eq!(body["original"]["size"], VIDEO_BYTES.len());
    assert_eq!(body["result"]["width"], 512);
    assert_eq!(body["result"]["height"], 288);
    assert_eq!(body["result"]["duration"], 1.5);
    assert_eq!(body["result"]["sizeValid"], true);
    assert!(body["result"]["filename"]
        .as_str()
        .unwrap()
        .ends_with(".webm"));

    let requests = fixture.transcoder.recorded_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].start_secs, 0.5);
    assert_eq!(requests[0].duration_secs, 1.5);
}

#[tokio::test]
async fn test_convert_video_finishes_after_client_disconnects() {
    let fixture = TestFixture::new().await;
    fixture
        .transcoder
        .set_pass_delay(Duration::from_millis(300))
        .await;
    let (listener, mut events) = fixture.broker.connect(64);
    fixture.broker.subscribe("vid-gone", listener);

    let parts = [video_part(), Part::Text("taskId", "vid-gone")];
    let request = fixture.post_multipart("/api/convert-video", &parts);
    // The client gives up while the encode pass is still running.
    assert!(tokio::time::timeout(Duration::from_millis(100), request)
        .await
        .is_err());

    let last = loop {
        let message = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("job never reached a terminal state")
            .unwrap();
        if message.type_name() != "progress" {
            break message;
        }
    };
    assert_eq!(last.type_name(), "complete");

    fixture.wait_for_reaper().await;
    assert_eq!(fixture.upload_count(), 0);
    assert_eq!(fixture.output_count(), 1);
    let health = fixture.get("/api/health").await;
    assert_eq!(health.body["processor"]["activeJobs"], 0);
    assert_eq!(health.body["processor"]["totalProcessed"], 1);
}

#[tokio::test]
async fn test_convert_video_default_trim() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_multipart(
            "/api/convert-video",
            &[video_part(), Part::Text("startTime", ""), Part::Text("endTime", "abc")],
        )
        .await;

    assert_eq!(response.status, StatusCode::OK, "body: {}", response.body);
    let requests = fixture.transcoder.recorded_requests().await;
    assert_eq!(requests[0].start_secs, 0.0);
    assert_eq!(requests[0].duration_secs, 3.0);
}

#[tokio::test]
async fn test_convert_video_second_pass_flags_non_compliant() {
    let fixture = TestFixture::new().await;
    fixture
        .transcoder
        .push_pass_sizes([400 * 1024, 300 * 1024])
        .await;

    let response = fixture
        .post_multipart("/api/convert-video", &[video_part()])
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["result"]["sizeValid"], false);
    assert_eq!(response.body["result"]["size"], 300 * 1024);
    assert_eq!(fixture.transcoder.pass_count().await, 2);
}

#[tokio::test]
async fn test_convert_video_invalid_trim() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_multipart(
            "/api/convert-video",
            &[
                video_part(),
                Part::Text("startTime", "2"),
                Part::Text("endTime", "1"),
            ],
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid time range"));
    assert_eq!(fixture.transcoder.pass_count().await, 0);

    fixture.wait_for_reaper().await;
    assert_eq!(fixture.upload_count(), 0);
}

#[tokio::test]
async fn test_convert_video_unreadable_input_is_400() {
    let fixture = TestFixture::new().await;
    fixture
        .transcoder
        .set_next_error(ConverterError::probe_failed("moov atom not found"))
        .await;

    let response = fixture
        .post_multipart("/api/convert-video", &[video_part()])
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_output_files_are_served() {
    let fixture = TestFixture::new().await;
    std::fs::write(fixture.output_dir.join("hello.txt"), b"sticker").unwrap();

    let response = fixture.get("/output/hello.txt").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "sticker");
}
