use crate::common::naming;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::common::upload::{stream_to_store, video_content_type};
use crate::modules::transcode::events::JobDescriptor;
use crate::modules::videos::dto::*;
use crate::modules::videos::service::ReadinessError;
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info};

/// Upload Video
/// Streams the `video` field into the incoming bucket, then queues it for transcoding.
#[utoipa::path(
    post,
    path = "/api/upload-video",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Upload successful", body = ApiResponse<UploadResponse>),
        (status = 400, description = "Missing or non-video file"),
        (status = 409, description = "A video with this name was already uploaded"),
        (status = 413, description = "Upload exceeds the size limit"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(ApiError(format!("Invalid multipart body: {}", e), e.status())),
        };

        if field.name() != Some("video") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError("Video field has no filename".to_string(), StatusCode::BAD_REQUEST))?;

        naming::validate_asset_name(&file_name)
            .map_err(|e| ApiError(e.to_string(), StatusCode::BAD_REQUEST))?;

        let content_type = video_content_type(field.content_type(), &file_name)
            .ok_or_else(|| ApiError("Only video files are allowed".to_string(), StatusCode::BAD_REQUEST))?;

        if state.incoming.exists(&file_name).await? {
            return Err(ApiError(
                format!("A video named {} was already uploaded", file_name),
                StatusCode::CONFLICT,
            ));
        }

        info!("Starting upload: {}", file_name);

        let bytes = stream_to_store(state.incoming.as_ref(), field, &file_name, &content_type)
            .await
            .map_err(|e| ApiError(format!("Upload failed: {}", e), e.status()))?;

        info!("⬆️ Stored {} ({} bytes)", file_name, bytes);

        // Published only once the object is finalized, so the worker never
        // races a half-written input.
        if let Err(e) = state.publisher.publish(&JobDescriptor::new(&file_name)).await {
            error!("Failed to queue transcoding for {}: {}", file_name, e);
            return Err(ApiError(
                "Video stored but transcoding could not be scheduled".to_string(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }

        return Ok(ApiSuccess(
            ApiResponse::success(UploadResponse { filename: file_name }, "Video uploaded successfully"),
            StatusCode::OK,
        )
        .into_response());
    }

    Err(ApiError("No video file provided".to_string(), StatusCode::BAD_REQUEST))
}

/// Get Processed Video
/// Reports whether every resolution variant is ready and, if so, where to download it.
#[utoipa::path(
    get,
    path = "/api/processed-videos/{filename}",
    params(
        ("filename" = String, Path, description = "Uploaded file name, e.g. movie.mp4")
    ),
    responses(
        (status = 200, description = "All variants ready", body = ProcessedVideoResponse),
        (status = 400, description = "Invalid file name"),
        (status = 404, description = "Still processing; retry later", body = NotReadyResponse),
        (status = 500, description = "Storage unavailable")
    ),
    tag = "Videos"
)]
pub async fn get_processed_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    match state.oracle.check(&filename).await {
        Ok(result) if result.all_ready => {
            Json(ProcessedVideoResponse::from(result)).into_response()
        }
        Ok(_) => {
            let retry_after = state.config.retry_after_secs;
            (
                StatusCode::NOT_FOUND,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(NotReadyResponse::new(retry_after)),
            )
                .into_response()
        }
        Err(ReadinessError::InvalidName(e)) => {
            ApiError(e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(ReadinessError::Storage(e)) => {
            error!("Readiness check for {} failed: {}", filename, e);
            ApiError("Failed to check processing status".to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
    }
}
