mod v1;

use axum::Router;
use axum::routing::get;
use utoipa_axum::router::OpenApiRouter;

use crate::handlers;
use crate::state::AppState;

pub fn api_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest("/v1", v1::routes())
}

/// Routes serving stored objects. Keys contain slashes, so this uses a
/// wildcard route outside the OpenAPI router.
pub fn media_routes() -> Router<AppState> {
    Router::new().route("/{*key}", get(handlers::media::serve_media))
}
