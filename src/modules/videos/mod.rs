use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::convert::Infallible;
use tower_http::limit::RequestBodyLimitLayer;

pub mod dto;
pub mod handler;
pub mod service;
pub mod stream_handler;

pub fn router(state: &AppState) -> Router<AppState> {
    // Uploads get their own ceiling instead of axum's 2MB default.
    let upload = post(handler::upload_video)
        .layer::<_, Infallible>(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_bytes));

    Router::new()
        .route("/upload-video", upload)
        .route("/processed-videos/{filename}", get(handler::get_processed_video))
        .route(
            "/processed-videos/{filename}/{quality}/stream",
            get(stream_handler::stream_variant),
        )
}
