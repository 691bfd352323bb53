use std::path::PathBuf;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{multipart::MultipartError, rejection::JsonRejection, Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::error::ServerError;
use super::AppState;
use crate::extract::ExtractionRequest;
use crate::page_range::PageRange;
use crate::workspace::{remove_path, schedule_removal};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub tool: String,
    pub tool_version: Option<String>,
}

/// Handler: GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        tool: state.extractor.tool().name().to_string(),
        tool_version: state.tool_version.clone(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub filename: String,
    pub size: u64,
    pub pages: u32,
    pub temp_path: String,
}

fn upload_error(err: MultipartError) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge
    } else {
        ServerError::InvalidUpload(err.body_text())
    }
}

fn is_pdf(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|ct| ct.trim().eq_ignore_ascii_case("application/pdf"))
}

/// Handler: POST /api/pdf/info
///
/// Stores the `pdf` field of a multipart upload and reports its page count.
pub async fn pdf_info(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<InfoResponse>, ServerError> {
    while let Some(mut field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some("pdf") {
            debug!(name = ?field.name(), "Skipping multipart field");
            continue;
        }

        if !is_pdf(field.content_type()) {
            return Err(ServerError::InvalidUpload(
                "Only PDF files are allowed".to_string(),
            ));
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "document.pdf".to_string());

        let path = state.extractor.dirs().new_upload_path();
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ServerError::Internal(format!("Cannot store upload: {}", e)))?;

        let mut size: u64 = 0;
        let written: Result<(), ServerError> = async {
            while let Some(chunk) = field.chunk().await.map_err(upload_error)? {
                size += chunk.len() as u64;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| ServerError::Internal(format!("Cannot store upload: {}", e)))?;
            }
            file.flush()
                .await
                .map_err(|e| ServerError::Internal(format!("Cannot store upload: {}", e)))
        }
        .await;

        if let Err(e) = written {
            drop(file);
            remove_path(&path).await;
            return Err(e);
        }

        info!(path = %path.display(), %filename, size, "Processing PDF");
        let count = state.extractor.page_count(&path).await;

        return Ok(Json(InfoResponse {
            filename,
            size,
            pages: count.pages,
            temp_path: path.display().to_string(),
        }));
    }

    warn!("No pdf field found in multipart upload");
    Err(ServerError::InvalidUpload("No PDF file provided".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractBody {
    pub temp_path: Option<String>,
    pub ranges: Option<Vec<PageRange>>,
    pub pages: Option<Vec<u32>>,
    pub filename: Option<String>,
}

/// Deletes the request's files once the response body is dropped, which
/// happens after the last byte is sent or when the client goes away.
struct CleanupGuard {
    paths: Vec<PathBuf>,
    delay: Duration,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        schedule_removal(std::mem::take(&mut self.paths), self.delay);
    }
}

/// `attachment` with an ASCII `filename` and the exact name as `filename*`
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

/// Handler: POST /api/pdf/extract
pub async fn extract_pages(
    State(state): State<AppState>,
    payload: Result<Json<ExtractBody>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(body) = payload.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;

    let temp_path = body
        .temp_path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ServerError::InvalidRequest("tempPath is required".to_string()))?;
    let source = state
        .extractor
        .dirs()
        .owned_upload(&temp_path)
        .ok_or_else(|| {
            ServerError::InvalidRequest("tempPath does not refer to an uploaded file".to_string())
        })?;
    let filename = body.filename.unwrap_or_else(|| "document.pdf".to_string());

    let request = match (body.ranges, body.pages) {
        (Some(ranges), None) => ExtractionRequest::from_ranges(source.clone(), &ranges, filename)?,
        (None, Some(pages)) => ExtractionRequest::from_pages(source.clone(), &pages, filename)?,
        _ => {
            return Err(ServerError::InvalidRequest(
                "exactly one of ranges or pages is required".to_string(),
            ))
        }
    };

    let download = state.extractor.extract(request).await?;
    let artifact = download.artifact;
    let guard = CleanupGuard {
        paths: vec![source, artifact.path.clone()],
        delay: state.cleanup_delay,
    };

    let file = tokio::fs::File::open(&artifact.path)
        .await
        .map_err(|e| ServerError::Internal(format!("Cannot open extracted file: {}", e)))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| ServerError::Internal(format!("Cannot open extracted file: {}", e)))?
        .len();

    info!(
        output = %artifact.path.display(),
        name = %artifact.display_name,
        parts = download.parts,
        bytes = length,
        "Sending extraction"
    );

    let stream = ReaderStream::new(file).map(move |chunk| {
        let _keep = &guard;
        chunk
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, download.kind.content_type())
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&artifact.display_name),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ServerError::Internal(e.to_string()))
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub success: bool,
}

/// Handler: DELETE /api/cleanup/:temp_path
pub async fn cleanup(
    State(state): State<AppState>,
    Path(temp_path): Path<String>,
) -> Result<Json<CleanupResponse>, ServerError> {
    let path = state
        .extractor
        .dirs()
        .owned_upload(&temp_path)
        .ok_or_else(|| ServerError::InvalidRequest("path is not an uploaded file".to_string()))?;

    match tokio::fs::remove_file(&path).await {
        Ok(()) => info!(path = %path.display(), "Temporary file removed on request"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Temporary file already gone")
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cleanup failed");
            return Err(ServerError::Internal("Failed to cleanup file".to_string()));
        }
    }

    Ok(Json(CleanupResponse { success: true }))
}
