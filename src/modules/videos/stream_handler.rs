use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
};
use crate::common::naming;
use crate::common::profile::TranscodeProfile;
use crate::infrastructure::storage::StorageError;
use crate::state::AppState;
use tokio_util::io::ReaderStream;

/// Stream one variant inline, with support for Range requests.
/// Proxies the object from S3/MinIO so a browser can preview it in a player.
#[utoipa::path(
    get,
    path = "/api/processed-videos/{filename}/{quality}/stream",
    params(
        ("filename" = String, Path, description = "Uploaded file name, e.g. movie.mp4"),
        ("quality" = String, Path, description = "Profile name: 360p, 480p, 720p or 1080p")
    ),
    responses(
        (status = 200, description = "Stream Content"),
        (status = 206, description = "Partial Content"),
        (status = 400, description = "Invalid file name"),
        (status = 404, description = "Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn stream_variant(
    State(state): State<AppState>,
    Path((filename, quality)): Path<(String, String)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if naming::validate_asset_name(&filename).is_err() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let Some(profile) = TranscodeProfile::by_name(&quality) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let key = naming::variant_key(&filename, profile);

    // 1. Forward the Range header untouched
    let range_header = headers.get(header::RANGE).and_then(|h| h.to_str().ok());

    // 2. Open the object
    let object = match state.processed.get(&key, range_header).await {
        Ok(object) => object,
        Err(StorageError::NotFound(_)) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!("S3 Error streaming {}: {}", key, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // 3. Build Response
    let mut builder = axum::response::Response::builder()
        .header(
            header::CONTENT_TYPE,
            object.content_type.as_deref().unwrap_or(naming::VARIANT_CONTENT_TYPE),
        )
        .header(header::CONTENT_DISPOSITION, "inline");

    if let Some(cl) = object.content_length {
        builder = builder.header(header::CONTENT_LENGTH, cl);
    }

    if let Some(cr) = &object.content_range {
        builder = builder.header(header::CONTENT_RANGE, cr).status(StatusCode::PARTIAL_CONTENT);
    } else {
        builder = builder.header(header::ACCEPT_RANGES, "bytes").status(StatusCode::OK);
    }

    if let Some(et) = &object.e_tag {
        builder = builder.header(header::ETAG, et);
    }

    // 4. Stream the body through without buffering
    let body = Body::from_stream(ReaderStream::new(object.body));

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
