//! Upload-and-convert routes.
//!
//! Both routes store the uploaded file under the uploads directory, run the
//! conversion to completion on its own task and answer with the final
//! result. A client that disconnects early does not stop the job. Progress goes
//! out separately over the WebSocket to listeners of the request's `taskId`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use stickerkit_core::notifier::now_millis;
use stickerkit_core::processor::StickerConstraints;
use stickerkit_core::{
    ConversionJob, ImageStickerResult, ProcessingError, TrimRange, VideoStickerResult,
};

use super::error::ApiError;
use crate::metrics::{record_conversion, NON_COMPLIANT_TOTAL, SECOND_PASS_TOTAL};
use crate::state::AppState;

/// Default clip window when the form leaves it out.
const DEFAULT_START_SECS: f64 = 0.0;
const DEFAULT_END_SECS: f64 = 3.0;

/// Successful conversion response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse<T: Serialize> {
    pub success: bool,
    pub task_id: Option<String>,
    #[serde(flatten)]
    pub sticker: T,
}

/// A file written to the uploads directory.
#[derive(Debug)]
struct StoredUpload {
    path: PathBuf,
    original_filename: String,
    size: u64,
}

#[derive(Debug, Default)]
struct ConvertForm {
    upload: Option<StoredUpload>,
    task_id: Option<String>,
    start_time: Option<f64>,
    end_time: Option<f64>,
}

impl ConvertForm {
    fn trim(&self) -> TrimRange {
        TrimRange::new(
            self.start_time.unwrap_or(DEFAULT_START_SECS),
            self.end_time.unwrap_or(DEFAULT_END_SECS),
        )
    }
}

/// POST /api/convert-image
///
/// Multipart field `image`, optional `taskId`.
pub async fn convert_image(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ConvertResponse<ImageStickerResult>>, ApiError> {
    let form = receive_form(&state, multipart, "image").await?;
    let Some(upload) = form.upload else {
        return Err(ApiError::bad_request("No image file uploaded"));
    };

    let job = build_job(&state, &upload, form.task_id.clone());
    info!(
        filename = %upload.original_filename,
        size = upload.size,
        task_id = form.task_id.as_deref().unwrap_or("-"),
        "Image upload received"
    );

    let processor = state.processor_handle();
    let result = run_detached(async move { processor.convert_image(job).await }).await;
    record_conversion("image", result.is_ok());
    let mut sticker = result?;
    sticker.original.size_bytes = upload.size;

    Ok(Json(ConvertResponse {
        success: true,
        task_id: form.task_id,
        sticker,
    }))
}

/// POST /api/convert-video
///
/// Multipart field `video`, optional `taskId`, `startTime` and `endTime`
/// in seconds.
pub async fn convert_video(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ConvertResponse<VideoStickerResult>>, ApiError> {
    let form = receive_form(&state, multipart, "video").await?;
    let trim = form.trim();
    let Some(upload) = form.upload else {
        return Err(ApiError::bad_request("No video or GIF file uploaded"));
    };

    let job = build_job(&state, &upload, form.task_id.clone()).with_trim(trim);
    info!(
        filename = %upload.original_filename,
        size = upload.size,
        start_secs = trim.start_secs,
        end_secs = trim.end_secs,
        task_id = form.task_id.as_deref().unwrap_or("-"),
        "Video upload received"
    );

    let processor = state.processor_handle();
    let result = run_detached(async move { processor.convert_video(job).await }).await;
    record_conversion("video", result.is_ok());
    let mut sticker = result?;
    sticker.original.size_bytes = upload.size;

    if sticker.result.passes > 1 {
        SECOND_PASS_TOTAL.inc();
    }
    if !sticker.result.size_valid {
        NON_COMPLIANT_TOTAL.inc();
    }

    Ok(Json(ConvertResponse {
        success: true,
        task_id: form.task_id,
        sticker,
    }))
}

/// Runs a conversion on its own task and waits for it.
async fn run_detached<T, F>(job: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ProcessingError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(job).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::Internal(format!("conversion task failed: {}", e))),
    }
}

fn build_job(state: &AppState, upload: &StoredUpload, task_id: Option<String>) -> ConversionJob {
    let constraints: StickerConstraints = state.processor().config().constraints;
    ConversionJob::new(&upload.path, &upload.original_filename, constraints).with_task_id(task_id)
}

/// Reads the multipart form, storing the file part on disk.
///
/// On failure any file already stored is handed to the reaper.
async fn receive_form(
    state: &AppState,
    mut multipart: Multipart,
    file_field: &str,
) -> Result<ConvertForm, ApiError> {
    let mut form = ConvertForm::default();
    match read_fields(state, &mut multipart, file_field, &mut form).await {
        Ok(()) => Ok(form),
        Err(e) => {
            if let Some(upload) = form.upload.take() {
                state.reaper().schedule(upload.path);
            }
            Err(e)
        }
    }
}

async fn read_fields(
    state: &AppState,
    multipart: &mut Multipart,
    file_field: &str,
    form: &mut ConvertForm,
) -> Result<(), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed upload: {}", e.body_text())))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            n if n == file_field => {
                if form.upload.is_some() {
                    return Err(ApiError::bad_request("Only one file may be uploaded"));
                }
                form.upload = Some(store_upload(state, field).await?);
            }
            "taskId" => {
                let text = read_text(field).await?;
                if !text.trim().is_empty() {
                    form.task_id = Some(text.trim().to_string());
                }
            }
            "startTime" => form.start_time = parse_seconds(&read_text(field).await?),
            "endTime" => form.end_time = parse_seconds(&read_text(field).await?),
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }
    Ok(())
}

async fn read_text(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed upload: {}", e.body_text())))
}

/// Unparseable or empty values fall back to the default.
fn parse_seconds(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

async fn store_upload(state: &AppState, mut field: Field<'_>) -> Result<StoredUpload, ApiError> {
    let upload_config = &state.config().upload;
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    if !upload_config.accepts(&content_type) {
        return Err(ApiError::bad_request(format!(
            "Unsupported file type: {}",
            content_type
        )));
    }

    let original_filename = field.file_name().unwrap_or("upload").to_string();
    let path = state
        .config()
        .paths
        .uploads
        .join(stored_file_name(&original_filename, now_millis()));

    let mut file = tokio::fs::File::create(&path).await?;
    let mut size: u64 = 0;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                drop(file);
                state.reaper().schedule(&path);
                return Err(ApiError::bad_request(format!(
                    "Failed to read file: {}",
                    e.body_text()
                )));
            }
        };
        size += chunk.len() as u64;
        if size > upload_config.max_file_size {
            drop(file);
            state.reaper().schedule(&path);
            warn!(filename = %original_filename, "Upload exceeds size limit");
            return Err(ApiError::bad_request("File too large"));
        }
        if let Err(e) = file.write_all(&chunk).await {
            drop(file);
            state.reaper().schedule(&path);
            return Err(e.into());
        }
    }
    file.flush().await?;

    if size == 0 {
        state.reaper().schedule(&path);
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    Ok(StoredUpload {
        path,
        original_filename,
        size,
    })
}

/// `<millis>-<random><ext>`, keeping a sanitized extension of the client name.
fn stored_file_name(original_filename: &str, millis: i64) -> String {
    let ext = Path::new(original_filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    format!("{}-{}{}", millis, uuid::Uuid::new_v4().simple(), ext)
}
