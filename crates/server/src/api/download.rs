//! Batch download of finished stickers as a single zip archive.
//!
//! Files are named by the public URL a conversion returned. Only files that
//! resolve inside the output directory are archived.

use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use stickerkit_core::notifier::now_millis;

use super::error::ApiError;
use crate::state::AppState;

/// Upper bound on files per archive.
pub const MAX_BATCH_FILES: usize = 100;

#[derive(Debug, Deserialize)]
pub struct BatchDownloadRequest {
    #[serde(default)]
    pub files: Vec<BatchFile>,
}

#[derive(Debug, Deserialize)]
pub struct BatchFile {
    /// Public URL returned by a conversion.
    pub url: String,
    /// Entry name inside the archive; defaults to the stored file name.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug)]
struct ArchiveEntry {
    name: String,
    path: PathBuf,
}

/// POST /api/download-batch
///
/// Body: `{"files":[{"url":"/output/...","name":"cat.png"}]}`. Files that no
/// longer exist are skipped; an URL outside the output directory fails the
/// whole request.
pub async fn download_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchDownloadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.files.is_empty() {
        return Err(ApiError::bad_request("No files requested"));
    }
    if request.files.len() > MAX_BATCH_FILES {
        return Err(ApiError::bad_request(format!(
            "Too many files, at most {} per download",
            MAX_BATCH_FILES
        )));
    }

    let paths = &state.config().paths;
    let output_dir = tokio::fs::canonicalize(&paths.output).await?;
    let entries = resolve_entries(&output_dir, &paths.output_url_prefix, &request.files).await?;
    if entries.is_empty() {
        return Err(ApiError::NotFound("None of the requested files exist".into()));
    }

    let count = entries.len();
    let archive = tokio::task::spawn_blocking(move || build_archive(&entries))
        .await
        .map_err(|e| ApiError::Internal(format!("archive task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(format!("failed to build archive: {}", e)))?;

    info!(files = count, bytes = archive.len(), "Batch download prepared");

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"stickers-{}.zip\"", now_millis()),
            ),
        ],
        archive,
    ))
}

async fn resolve_entries(
    output_dir: &Path,
    url_prefix: &str,
    files: &[BatchFile],
) -> Result<Vec<ArchiveEntry>, ApiError> {
    let mut entries = Vec::with_capacity(files.len());
    let mut names = HashSet::new();

    for file in files {
        let Some(stored) = stored_file_name(url_prefix, &file.url) else {
            warn!(url = %file.url, "Rejecting batch download outside the output directory");
            return Err(ApiError::bad_request(format!("Invalid file URL: {}", file.url)));
        };

        let path = match tokio::fs::canonicalize(output_dir.join(stored)).await {
            Ok(path) => path,
            Err(_) => {
                debug!(url = %file.url, "Requested file is gone, skipping");
                continue;
            }
        };
        // Symlinks may still point elsewhere.
        if !path.starts_with(output_dir) {
            warn!(url = %file.url, "Rejecting batch download outside the output directory");
            return Err(ApiError::bad_request(format!("Invalid file URL: {}", file.url)));
        }
        if !tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            continue;
        }

        let mut name = entry_name(file.name.as_deref(), stored);
        let mut n = 1;
        while !names.insert(name.clone()) {
            n += 1;
            name = format!("{}-{}", n, entry_name(file.name.as_deref(), stored));
        }
        entries.push(ArchiveEntry { name, path });
    }
    Ok(entries)
}

/// The file name a public URL refers to, if it is a direct child of the
/// output prefix.
fn stored_file_name<'a>(url_prefix: &str, url: &'a str) -> Option<&'a str> {
    let rest = url
        .strip_prefix(url_prefix.trim_end_matches('/'))?
        .strip_prefix('/')?;
    let name = rest.split(['?', '#']).next().unwrap_or(rest);
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    plain.then_some(name)
}

/// Archive entry name: the last component of the client's name, or the
/// stored name.
fn entry_name(requested: Option<&str>, stored: &str) -> String {
    requested
        .map(|name| name.rsplit(['/', '\\']).next().unwrap_or(name).trim())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or(stored)
        .to_string()
}

fn build_archive(entries: &[ArchiveEntry]) -> zip::result::ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for entry in entries {
        writer.start_file(entry.name.as_str(), options)?;
        let mut source = std::fs::File::open(&entry.path)?;
        std::io::copy(&mut source, &mut writer)?;
    }
    Ok(writer.finish()?.into_inner())
}
