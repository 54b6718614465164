//! Download management handlers.

use crate::api::AppState;
use crate::error::ApiError;
use crate::types::{
    JobId, JobInfo, JobState, PreviewRequest, StatusResponse, SubmitRequest, SubmitResponse,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

/// POST /download - Submit a media URL for asynchronous download
#[utoipa::path(
    post,
    path = "/download",
    tag = "downloads",
    request_body = SubmitRequest,
    responses(
        (status = 202, description = "Download accepted and queued", body = SubmitResponse),
        (status = 400, description = "Invalid URL or filename"),
        (status = 502, description = "Broker rejected the task"),
        (status = 503, description = "Service is shutting down")
    )
)]
pub async fn submit_download(
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    match state.dispatcher.submit(payload).await {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                download_id: job.id,
                status: "queued".to_string(),
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /download/status/:download_id - Report the lifecycle state of a download
#[utoipa::path(
    get,
    path = "/download/status/{download_id}",
    tag = "downloads",
    params(
        ("download_id" = String, Path, description = "Download id returned on submission")
    ),
    responses(
        (status = 200, description = "Current download state", body = StatusResponse),
        (status = 404, description = "Download not found")
    )
)]
pub async fn download_status(
    State(state): State<AppState>,
    Path(download_id): Path<String>,
) -> Response {
    let id = JobId::from(download_id);
    match state.dispatcher.status(&id).await {
        Ok(job) => {
            let info = JobInfo::from(&job);
            (
                StatusCode::OK,
                Json(StatusResponse {
                    download_id: job.id,
                    state: job.state,
                    info,
                }),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// GET /download/file/:download_id - Stream the finished artifact
#[utoipa::path(
    get,
    path = "/download/file/{download_id}",
    tag = "downloads",
    params(
        ("download_id" = String, Path, description = "Download id returned on submission")
    ),
    responses(
        (status = 200, description = "Artifact bytes", content_type = "application/octet-stream"),
        (status = 400, description = "Download not yet complete, or failed"),
        (status = 404, description = "Download not found, or artifact missing")
    )
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(download_id): Path<String>,
) -> Response {
    let id = JobId::from(download_id);

    let job = match state.dispatcher.status(&id).await {
        Ok(job) => job,
        Err(e) => return e.into_response(),
    };

    match job.state {
        JobState::Queued | JobState::InProgress => (
            StatusCode::BAD_REQUEST,
            Json(ApiError::not_ready("Download not yet complete")),
        )
            .into_response(),
        JobState::Failed => {
            let message = job.error.unwrap_or_else(|| "Download failed".to_string());
            (
                StatusCode::BAD_REQUEST,
                Json(ApiError::new("download_failed", message)),
            )
                .into_response()
        }
        JobState::Finished => {
            let Some(path) = job.artifact_path else {
                tracing::error!(download_id = %id, "Finished download has no artifact path recorded");
                return (StatusCode::NOT_FOUND, Json(ApiError::not_found("File"))).into_response();
            };

            let file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    // The record says Finished but the artifact is gone, most
                    // likely swept by cleanup or removed out of band.
                    tracing::error!(
                        download_id = %id,
                        path = %path.display(),
                        error = %e,
                        "Artifact missing for finished download"
                    );
                    return (StatusCode::NOT_FOUND, Json(ApiError::not_found("File")))
                        .into_response();
                }
            };

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{id}.bin"));
            let disposition = format!(
                "attachment; filename*=UTF-8''{}",
                urlencoding::encode(&file_name)
            );

            let stream = ReaderStream::new(file);
            let body = Body::from_stream(stream);

            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response()
        }
    }
}

/// POST /preview - Retrieve media metadata without downloading
#[utoipa::path(
    post,
    path = "/preview",
    tag = "downloads",
    request_body = PreviewRequest,
    responses(
        (status = 200, description = "Media metadata and selectable formats", body = crate::types::PreviewInfo),
        (status = 400, description = "Invalid URL"),
        (status = 502, description = "Metadata extraction failed"),
        (status = 504, description = "Metadata extraction timed out")
    )
)]
pub async fn preview_media(
    State(state): State<AppState>,
    Json(payload): Json<PreviewRequest>,
) -> Response {
    match state.dispatcher.preview(&payload.url).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => e.into_response(),
    }
}
