use axum::Json;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entity::{license_option, purchase, spec};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::genres;
use crate::ingestion::{
    FileRole, MediaError, StagedFiles, StagingArea, StoredObject, delete_objects,
};
use crate::licensing::LicenseReconciler;
use crate::models::shared::normalize_names;
use crate::models::spec::{CreateSpecRequest, SpecResponse, UpdateSpecRequest, parse_metadata};
use crate::state::AppState;

/// Response header reporting whether Get was served from the cache.
pub const X_CACHE: &str = "x-cache";

pub fn spec_upload_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(1024 * 1024 * 1024) // 1 GB across all parts
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Specs",
    operation_id = "createSpec",
    summary = "Create a spec",
    description = "Accepts a `metadata` JSON part plus optional `image`, `preview`, `wav` and `stems` \
        file parts. Files are staged locally and processed in the background; the response \
        carries the Spec in `processing` state. Beats require both `wav` and `stems`.",
    request_body(content_type = "multipart/form-data", description = "Spec metadata and media files"),
    responses(
        (status = 202, description = "Spec accepted for processing", body = SpecResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 500, description = "Upload could not be staged (STAGING_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(producer_id = %auth_user.user_id))]
pub async fn create_spec(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let (metadata, staged) = read_spec_multipart(&state.staging, &mut multipart).await?;

    let request = match metadata
        .ok_or_else(|| AppError::Validation("Missing 'metadata' field".into()))
        .and_then(|raw| parse_metadata::<CreateSpecRequest>(&raw))
    {
        Ok(request) => request,
        Err(e) => {
            staged.cleanup().await;
            return Err(e);
        }
    };

    let spec = state
        .coordinator
        .create(auth_user.user_id, request, staged)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(spec)))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Specs",
    operation_id = "getSpec",
    summary = "Get a spec by ID",
    description = "Returns the Spec with its active license options and genres. The preview URL is \
        presigned. Responses are cached; the `X-Cache` header is `HIT` or `MISS`.",
    params(("id" = Uuid, Path, description = "Spec ID")),
    responses(
        (status = 200, description = "Spec details", body = SpecResponse,
            headers(("x-cache" = String, description = "HIT or MISS"))),
        (status = 404, description = "Spec not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(spec_id = %id))]
pub async fn get_spec(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    if let Some(cached) = state.cache.get(id).await {
        return cached_json(cached, "HIT");
    }
    let generation = state.cache.generation(id).await;

    let model = find_active_spec(&state.db, id).await?;
    let preview_url = model.preview_url.clone();

    let mut response = load_response(&state.db, model).await?;
    response.preview_url = presign_preview(&state, &preview_url).await;

    let payload = serde_json::to_string(&response)
        .map_err(|e| AppError::Internal(format!("Failed to serialize spec: {e}")))?;
    state.cache.set_detached(id, payload.clone(), generation);

    cached_json(payload, "MISS")
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Specs",
    operation_id = "updateSpec",
    summary = "Update a spec",
    description = "Accepts an optional `metadata` JSON part and an optional replacement `image`. \
        Fields are updated and the license list is reconciled in one transaction. Options \
        omitted from `licenses` are removed, or retired if they have been purchased.",
    params(("id" = Uuid, Path, description = "Spec ID")),
    request_body(content_type = "multipart/form-data", description = "Metadata and optional image"),
    responses(
        (status = 200, description = "Spec updated", body = SpecResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owning producer (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Spec not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(spec_id = %id, producer_id = %auth_user.user_id))]
pub async fn update_spec(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<SpecResponse>, AppError> {
    let (metadata, staged) = read_spec_multipart(&state.staging, &mut multipart).await?;
    let result = update_with_staged(&state, &auth_user, id, metadata, &staged).await;
    staged.cleanup().await;
    let response = result?;

    state.cache.invalidate(id).await;
    Ok(Json(response))
}

async fn update_with_staged(
    state: &AppState,
    auth_user: &AuthUser,
    id: Uuid,
    metadata: Option<String>,
    staged: &StagedFiles,
) -> Result<SpecResponse, AppError> {
    let existing = find_active_spec(&state.db, id).await?;
    auth_user.require_owner(existing.producer_id)?;

    let request = match metadata {
        Some(raw) => parse_metadata::<UpdateSpecRequest>(&raw)?,
        None => UpdateSpecRequest::default(),
    };
    request.validate()?;

    if let Some((role, _)) = staged.iter().find(|(role, _)| *role != FileRole::Image) {
        return Err(AppError::Validation(format!(
            "Only the image can be replaced, got '{}'",
            role.spec().field
        )));
    }

    let new_image = match staged.get(FileRole::Image) {
        Some(file) => Some(
            state
                .processor()
                .process(FileRole::Image, file)
                .await
                .map_err(media_error)?,
        ),
        None => None,
    };

    let updated = match apply_update(state, id, request, new_image.as_ref()).await {
        Ok(model) => model,
        Err(e) => {
            if let Some(image) = &new_image {
                let report = delete_objects(&*state.object_store, &[image.key.clone()]).await;
                warn!(rolled_back = report.deleted(), "Update failed, removed replacement image");
            }
            return Err(e);
        }
    };

    if new_image.is_some()
        && let Some(old_key) = state.object_store.key_for_url(&existing.image_url)
    {
        let report = delete_objects(&*state.object_store, &[old_key]).await;
        if !report.is_clean() {
            warn!("Failed to remove replaced image");
        }
    }

    load_response(&state.db, updated).await
}

/// Field update, license reconciliation and genre relink in one transaction.
async fn apply_update(
    state: &AppState,
    id: Uuid,
    request: UpdateSpecRequest,
    new_image: Option<&StoredObject>,
) -> Result<spec::Model, AppError> {
    let txn = state.db.begin().await?;

    let existing = find_active_spec(&txn, id).await?;
    let mut active = existing.into_active_model();

    if let Some(ref title) = request.title {
        active.title = Set(title.trim().to_string());
    }
    if let Some(bpm) = request.bpm {
        active.bpm = Set(bpm);
    }
    if let Some(key) = request.key {
        active.musical_key = Set(key);
    }
    if let Some(price) = request.price {
        active.price = Set(price);
    }
    if let Some(ref tags) = request.tags {
        active.tags = Set(normalize_names(tags).into());
    }
    if let Some(description) = request.description {
        active.description = Set(description);
    }
    if let Some(enabled) = request.free_mp3_enabled {
        active.free_mp3_enabled = Set(enabled);
    }
    if let Some(duration) = request.duration {
        active.duration = Set(duration);
    }
    if let Some(image) = new_image {
        active.image_url = Set(image.url.clone());
    }
    active.updated_at = Set(Utc::now());

    let model = active.update(&txn).await?;

    if let Some(licenses) = request.licenses {
        LicenseReconciler::new(&txn).reconcile(id, licenses).await?;
    }
    if let Some(ref names) = request.genres {
        genres::relink(&txn, id, &normalize_names(names)).await?;
    }

    txn.commit().await?;
    Ok(model)
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Specs",
    operation_id = "deleteSpec",
    summary = "Delete a spec",
    description = "Specs without purchases are removed together with their license options and \
        stored media. Specs with purchases are only marked deleted and keep their media.",
    params(("id" = Uuid, Path, description = "Spec ID")),
    responses(
        (status = 204, description = "Spec deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owning producer (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Spec not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(spec_id = %id, producer_id = %auth_user.user_id))]
pub async fn delete_spec(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let existing = find_active_spec(&state.db, id).await?;
    auth_user.require_owner(existing.producer_id)?;

    let purchases = purchase::Entity::find()
        .filter(purchase::Column::SpecId.eq(id))
        .count(&state.db)
        .await?;

    if purchases > 0 {
        let now = Utc::now();
        spec::Entity::update_many()
            .col_expr(spec::Column::IsDeleted, Expr::value(true))
            .col_expr(spec::Column::DeletedAt, Expr::value(Some(now)))
            .col_expr(spec::Column::UpdatedAt, Expr::value(now))
            .filter(spec::Column::Id.eq(id))
            .exec(&state.db)
            .await?;
        info!(purchases, "Soft-deleted spec with issued licenses");
    } else {
        let txn = state.db.begin().await?;
        hard_delete(&txn, id).await?;
        txn.commit().await?;

        let keys: Vec<String> = media_urls(&existing)
            .filter_map(|url| state.object_store.key_for_url(url))
            .collect();
        let report = delete_objects(&*state.object_store, &keys).await;
        info!(
            attempted = report.attempted,
            failed = report.failed.len(),
            "Hard-deleted spec"
        );
    }

    state.cache.invalidate(id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn hard_delete(txn: &DatabaseTransaction, id: Uuid) -> Result<(), AppError> {
    license_option::Entity::delete_many()
        .filter(license_option::Column::SpecId.eq(id))
        .exec(txn)
        .await?;
    genres::unlink_all(txn, id).await?;
    spec::Entity::delete_by_id(id).exec(txn).await?;
    Ok(())
}

/// Non-empty media URLs of a Spec.
fn media_urls(model: &spec::Model) -> impl Iterator<Item = &str> {
    [
        Some(model.image_url.as_str()),
        Some(model.preview_url.as_str()),
        model.wav_url.as_deref(),
        model.stems_url.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|url| !url.is_empty())
}

/// Look up a Spec that has not been soft-deleted.
async fn find_active_spec<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<spec::Model, AppError> {
    spec::Entity::find_by_id(id)
        .filter(spec::Column::IsDeleted.eq(false))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Spec not found".into()))
}

async fn load_response<C: ConnectionTrait>(
    db: &C,
    model: spec::Model,
) -> Result<SpecResponse, AppError> {
    let licenses = LicenseReconciler::new(db).active_options(model.id).await?;
    let genres = genres::names_for(db, model.id).await?;
    Ok(SpecResponse::from_parts(model, licenses, genres))
}

/// Presigned form of a stored preview URL. Falls back to the stored value.
async fn presign_preview(state: &AppState, preview_url: &str) -> String {
    let Some(key) = state.object_store.key_for_url(preview_url) else {
        return preview_url.to_string();
    };
    match state
        .object_store
        .presign(&key, state.config.storage.presign_ttl())
        .await
    {
        Ok(url) => url,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to presign preview URL");
            preview_url.to_string()
        }
    }
}

fn cached_json(payload: String, cache_status: &'static str) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(X_CACHE, cache_status)
        .body(Body::from(payload))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

fn media_error(err: MediaError) -> AppError {
    match err {
        MediaError::Image(e) => AppError::Validation(format!("Invalid image: {e}")),
        other => AppError::Internal(other.to_string()),
    }
}

/// Read the `metadata` part and stage every recognised file part.
/// Nothing stays on disk when this returns an error.
async fn read_spec_multipart(
    staging: &StagingArea,
    multipart: &mut Multipart,
) -> Result<(Option<String>, StagedFiles), AppError> {
    let mut metadata = None;
    let mut staged = StagedFiles::new();

    match collect_parts(staging, multipart, &mut metadata, &mut staged).await {
        Ok(()) => Ok((metadata, staged)),
        Err(e) => {
            staged.cleanup().await;
            Err(e)
        }
    }
}

async fn collect_parts(
    staging: &StagingArea,
    multipart: &mut Multipart,
    metadata: &mut Option<String>,
    staged: &mut StagedFiles,
) -> Result<(), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "metadata" {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read metadata: {e}")))?;
            *metadata = Some(text);
            continue;
        }

        let Some(role) = FileRole::from_field_name(&name) else {
            continue; // Ignore unknown fields.
        };

        let file = staging.stage_field(field).await?;
        if file.size == 0 {
            file.remove().await;
            continue;
        }
        if let Err(rejected) = staged.insert(role, file) {
            rejected.remove().await;
            return Err(AppError::Validation(format!("Duplicate '{name}' file")));
        }
    }
    Ok(())
}
