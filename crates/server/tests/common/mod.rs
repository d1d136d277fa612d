//! Common test utilities for in-process API testing with mocks.
//!
//! The fixture wires a real broker and reaper to mock encoders and serves
//! the router without binding a socket.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use stickerkit_core::testing::{MockImageEncoder, MockTranscoder};
use stickerkit_core::{
    create_broker, create_reaper, Config, FileReaper, ImageEncoder, ProcessorConfig,
    StickerProcessor, SubscriptionBroker, Transcoder,
};
use stickerkit_server::state::AppState;

/// Re-export fixtures for test convenience
pub use stickerkit_core::testing::fixtures;

const BOUNDARY: &str = "stickerkit-test-boundary";

/// Grace period for delayed deletes in tests.
pub const TEST_DELETE_GRACE: Duration = Duration::from_millis(20);

/// Test fixture with mock encoders and temporary working directories.
pub struct TestFixture {
    pub router: Router,
    pub transcoder: MockTranscoder,
    pub image_encoder: MockImageEncoder,
    pub broker: SubscriptionBroker,
    pub reaper: FileReaper,
    pub uploads_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Keeps the working directories alive
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// One part of a multipart form.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a fixture after adjusting the default config.
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let uploads_dir = temp_dir.path().join("uploads");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&uploads_dir).unwrap();
        std::fs::create_dir_all(&output_dir).unwrap();

        let mut config = Config::default();
        config.paths.uploads = uploads_dir.clone();
        config.paths.output = output_dir.clone();
        adjust(&mut config);

        let (broker, broker_actor) = create_broker();
        tokio::spawn(broker_actor.run());
        let (reaper, reaper_task) = create_reaper(TEST_DELETE_GRACE);
        tokio::spawn(reaper_task.run());

        let transcoder = MockTranscoder::new();
        let image_encoder = MockImageEncoder::new();

        let processor = Arc::new(StickerProcessor::new(
            ProcessorConfig::from_config(&config),
            Arc::new(transcoder.clone()) as Arc<dyn Transcoder>,
            Arc::new(image_encoder.clone()) as Arc<dyn ImageEncoder>,
            broker.clone(),
            reaper.clone(),
        ));

        let state = Arc::new(AppState::new(
            config,
            processor,
            broker.clone(),
            reaper.clone(),
        ));
        let router = stickerkit_server::api::create_router(state);

        Self {
            router,
            transcoder,
            image_encoder,
            broker,
            reaper,
            uploads_dir,
            output_dir,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Send a multipart POST request.
    pub async fn post_multipart(&self, path: &str, parts: &[Part<'_>]) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.send(request).await
    }

    /// Send a JSON POST request, returning the raw response body.
    pub async fn post_json_raw(&self, path: &str, body: &Value) -> (StatusCode, HeaderMap, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes.to_vec())
    }

    /// Send a JSON POST request expecting a JSON answer.
    pub async fn post_json(&self, path: &str, body: &Value) -> TestResponse {
        let (status, _, bytes) = self.post_json_raw(path, body).await;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse { status, body }
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };
        TestResponse { status, body }
    }

    /// Files currently in the uploads directory.
    pub fn upload_count(&self) -> usize {
        count_files(&self.uploads_dir)
    }

    /// Files currently in the output directory.
    pub fn output_count(&self) -> usize {
        count_files(&self.output_dir)
    }

    /// Wait for delayed deletes scheduled so far to run.
    pub async fn wait_for_reaper(&self) {
        tokio::time::sleep(TEST_DELETE_GRACE * 5).await;
    }
}

fn count_files(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).count())
        .unwrap_or(0)
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
