use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use common::storage::{ObjectStore, validate_key};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::ingestion::FileRole;
use crate::state::AppState;

/// Query parameters appended by a presigned URL.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PresignQuery {
    /// Unix timestamp after which the URL is rejected.
    pub expires: Option<i64>,
    /// Hex signature over the key and expiry.
    pub signature: Option<String>,
}

#[utoipa::path(
    get,
    path = "/media/{key}",
    tag = "Media",
    operation_id = "getMedia",
    summary = "Stream a stored media object",
    description = "Images are public. Previews, WAV masters and stems require the `expires` and \
        `signature` parameters of a presigned URL.",
    params(
        ("key" = String, Path, description = "Object key, e.g. `images/<uuid>.jpg`"),
        PresignQuery,
    ),
    responses(
        (status = 200, description = "Object content"),
        (status = 400, description = "Malformed key (VALIDATION_ERROR)", body = ErrorBody),
        (status = 403, description = "Missing, expired or invalid signature (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Object not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn serve_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<PresignQuery>,
) -> Result<Response, AppError> {
    validate_key(&key)?;

    let role = FileRole::from_key(&key)
        .ok_or_else(|| AppError::NotFound("Object not found".into()))?;

    if role.spec().signed {
        let (Some(expires), Some(signature)) = (query.expires, query.signature.as_deref()) else {
            return Err(AppError::PermissionDenied);
        };
        state.media_files.verify_signature(&key, expires, signature)?;
    }

    let reader = state.media_files.get_stream(&key).await?;
    let content_type = mime_guess::from_path(&key)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| role.spec().content_type.to_string());

    let cache_control = if role.spec().signed {
        "private, no-store"
    } else {
        "public, max-age=86400"
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, cache_control)
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}
