use utoipa::OpenApi;
use crate::modules::videos::dto::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::videos::handler::upload_video,
        crate::modules::videos::handler::get_processed_video,
        crate::modules::videos::stream_handler::stream_variant,
    ),
    components(
        schemas(
            UploadResponse,
            VariantResponse,
            ProcessedVideoResponse,
            NotReadyResponse,
        )
    ),
    tags(
        (name = "Videos", description = "Upload, transcoding status and variant delivery")
    )
)]
pub struct ApiDoc;
