//! OpenAPI documentation aggregator.
//!
//! Collects all `#[utoipa::path]`-annotated handlers and `ToSchema`-derived
//! types into a single OpenAPI 3.1 spec, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "stupid-db API",
        version = "0.1.0",
        description = "Streaming agent execution gateway.",
    ),
    tags(
        (name = "Health", description = "Server readiness"),
        (name = "chat", description = "Streaming agent execution gateway"),
    ),
    paths(
        crate::api::health::health,
        crate::api::chat::post_chat,
    ),
    components(schemas(
        crate::api::health::HealthResponse,
        crate::api::chat::ChatRequest,
        crate::api::chat::ChatErrorResponse,
    ))
)]
pub struct ApiDoc;
