//! File API handlers.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::file::{Download, DownloadStatus, FileRecord, UploadRequest, UploadStatus};
use crate::web::error::ApiError;
use crate::{DocstoreError, Result as DocstoreResult};

use super::AppState;

/// Query for `GET /f/dt`.
#[derive(Debug, Deserialize)]
pub struct DetailsQuery {
    pub title: String,
}

/// Body for `POST /f/fd`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, with = "crate::datetime::api_format_opt")]
    pub date: Option<NaiveDateTime>,
}

/// POST /f/ul - Upload a file.
///
/// Multipart fields: `file`, `title`, `description`.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut filename: Option<String> = None;
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut content: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Failed to read multipart field: {}", e);
        ApiError::bad_request("Invalid multipart data")
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                content = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| {
                            tracing::warn!("Failed to read file content: {}", e);
                            ApiError::bad_request("Failed to read file")
                        })?
                        .to_vec(),
                );
            }
            "title" => {
                title = Some(field.text().await.map_err(|e| {
                    tracing::warn!("Failed to read title: {}", e);
                    ApiError::bad_request("Invalid title")
                })?);
            }
            "description" => {
                description = Some(field.text().await.map_err(|e| {
                    tracing::warn!("Failed to read description: {}", e);
                    ApiError::bad_request("Invalid description")
                })?);
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    let content = content.ok_or_else(|| ApiError::bad_request("No file content"))?;
    let title = title.ok_or_else(|| ApiError::bad_request("No title provided"))?;

    if content.len() as u64 > state.max_upload_size {
        let max_mb = state.max_upload_size / 1024 / 1024;
        return Err(ApiError::payload_too_large(format!(
            "File too large (max {max_mb}MB)"
        )));
    }

    let request = UploadRequest::new(filename, title, content)
        .with_description(description.unwrap_or_default());
    let status = upload_outcome(state.files.save(request)?.await)?;

    let code = if status.is_success() {
        StatusCode::OK
    } else {
        StatusCode::EXPECTATION_FAILED
    };
    Ok((code, status.message()).into_response())
}

/// A save unit that died in the pool is reported like any other failed upload.
fn upload_outcome(result: DocstoreResult<UploadStatus>) -> Result<UploadStatus, ApiError> {
    match result {
        Ok(status) => Ok(status),
        Err(DocstoreError::TaskFailed(reason)) => {
            tracing::error!(reason = %reason, "Upload task failed");
            Ok(UploadStatus::Failed)
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /f/dl/:title - Download a file, honoring `Range`.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(title): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    // Opaque bytes stay in the header so it resolves as malformed.
    let range = headers
        .get(header::RANGE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()));

    let download = state
        .files
        .load_by_title(&title, range.as_deref())?
        .await?;
    download_response(download)
}

fn download_response(download: Download) -> Result<Response, ApiError> {
    let builder = Response::builder().header(header::ACCEPT_RANGES, "bytes");

    let response = match download.status {
        DownloadStatus::NotFound => return Err(ApiError::not_found("File not found")),
        DownloadStatus::RangeNotSatisfiable => {
            let mut builder = builder.status(StatusCode::RANGE_NOT_SATISFIABLE);
            if let Some(content_range) = &download.content_range {
                builder = builder.header(header::CONTENT_RANGE, content_range);
            }
            builder.body(Body::empty())
        }
        DownloadStatus::Ok | DownloadStatus::PartialContent => {
            let content_type = download
                .filename
                .as_deref()
                .map(|name| mime_guess::from_path(name).first_or_octet_stream())
                .unwrap_or(mime_guess::mime::APPLICATION_OCTET_STREAM);

            let status = if download.status == DownloadStatus::PartialContent {
                StatusCode::PARTIAL_CONTENT
            } else {
                StatusCode::OK
            };

            let mut builder = builder
                .status(status)
                .header(header::CONTENT_TYPE, content_type.as_ref())
                .header(header::CONTENT_LENGTH, download.body.len());
            if let Some(disposition) = &download.content_disposition {
                builder = builder.header(header::CONTENT_DISPOSITION, disposition);
            }
            if let Some(content_range) = &download.content_range {
                builder = builder.header(header::CONTENT_RANGE, content_range);
            }
            builder.body(Body::from(download.body))
        }
    };

    response.map_err(|e| {
        tracing::error!("Failed to build response: {}", e);
        ApiError::internal("Failed to build response")
    })
}

/// GET /f/ls - List all files.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FileRecord>>, ApiError> {
    let records = state.files.list_all()?.await?;
    Ok(Json(records))
}

/// GET /f/dt?title= - Get file details.
pub async fn file_details(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DetailsQuery>,
) -> Result<Json<FileRecord>, ApiError> {
    let record = state
        .files
        .get_details(&query.title)?
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;
    Ok(Json(record))
}

/// POST /f/fd - Find titles by title and/or day.
pub async fn find_files(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    let titles = state
        .files
        .search(request.title.as_deref(), request.date)?
        .await?;
    Ok(Json(titles))
}
