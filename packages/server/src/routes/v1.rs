use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest("/specs", spec_routes())
}

fn spec_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::spec::create_spec))
        .routes(routes!(
            handlers::spec::get_spec,
            handlers::spec::update_spec,
            handlers::spec::delete_spec
        ))
        .layer(handlers::spec::spec_upload_body_limit())
}
