use std::sync::Arc;

use chrono::Utc;
use common::ProcessingStatus;
use futures::FutureExt;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, TransactionTrait};
use tracing::{Instrument, debug, info, instrument};
use uuid::Uuid;

use super::executor::JobExecutor;
use super::job::{IngestionContext, IngestionJob};
use super::role::FileRole;
use super::staging::StagedFiles;
use crate::entity::spec;
use crate::error::AppError;
use crate::genres;
use crate::licensing::{LicenseReconciler, ReconcileError, plan};
use crate::models::shared::normalize_names;
use crate::models::spec::{CreateSpecRequest, SpecResponse};

/// Owns the synchronous half of Create and hands the rest to the executor.
pub struct IngestionCoordinator {
    ctx: Arc<IngestionContext>,
    executor: Arc<dyn JobExecutor>,
}

impl IngestionCoordinator {
    pub fn new(ctx: Arc<IngestionContext>, executor: Arc<dyn JobExecutor>) -> Self {
        Self { ctx, executor }
    }

    pub fn context(&self) -> &Arc<IngestionContext> {
        &self.ctx
    }

    /// Validate, insert the Spec as `processing` and schedule its ingestion job.
    ///
    /// The insert and the hand-off to the executor run on their own task, so
    /// a client that disconnects cannot leave a `processing` row without a
    /// job. Staged files are removed on every error path; on success the job
    /// owns them.
    #[instrument(skip(self, request, staged), fields(spec_id))]
    pub async fn create(
        &self,
        producer_id: Uuid,
        request: CreateSpecRequest,
        staged: StagedFiles,
    ) -> Result<SpecResponse, AppError> {
        if let Err(e) = validate(&request, &staged) {
            staged.cleanup().await;
            return Err(e);
        }

        let spec_id = Uuid::now_v7();
        tracing::Span::current().record("spec_id", tracing::field::display(spec_id));

        let accept = accept(
            self.ctx.clone(),
            self.executor.clone(),
            spec_id,
            producer_id,
            request,
            staged,
        );
        tokio::spawn(accept.in_current_span())
            .await
            .map_err(|e| AppError::Internal(format!("Create task failed: {e}")))?
    }
}

/// Insert the Spec, then submit its job. Runs detached from the request.
async fn accept(
    ctx: Arc<IngestionContext>,
    executor: Arc<dyn JobExecutor>,
    spec_id: Uuid,
    producer_id: Uuid,
    request: CreateSpecRequest,
    staged: StagedFiles,
) -> Result<SpecResponse, AppError> {
    let response = match insert_spec(&ctx.db, spec_id, producer_id, &request).await {
        Ok(response) => response,
        Err(e) => {
            staged.cleanup().await;
            return Err(e.into());
        }
    };

    let job = IngestionJob {
        spec_id,
        producer_id,
        title: response.title.clone(),
        category: response.category,
        staged,
    };
    info!(files = job.staged.len(), "Spec accepted, scheduling ingestion");

    executor
        .submit(
            async move {
                let outcome = job.run(ctx).await;
                debug!(?outcome, "Ingestion job finished");
            }
            .boxed(),
        )
        .await;

    Ok(response)
}

fn validate(request: &CreateSpecRequest, staged: &StagedFiles) -> Result<(), AppError> {
    request.validate()?;
    for role in FileRole::required_for(request.category) {
        if !staged.contains(*role) {
            return Err(AppError::Validation(format!(
                "A {} requires a '{}' file",
                request.category,
                role.spec().field
            )));
        }
    }
    Ok(())
}

/// Insert the Spec row, its license options and genre links in one transaction.
async fn insert_spec(
    db: &DatabaseConnection,
    spec_id: Uuid,
    producer_id: Uuid,
    request: &CreateSpecRequest,
) -> Result<SpecResponse, ReconcileError> {
    let txn = db.begin().await?;
    let now = Utc::now();

    let model = spec::ActiveModel {
        id: Set(spec_id),
        producer_id: Set(producer_id),
        title: Set(request.title.trim().to_string()),
        category: Set(request.category),
        bpm: Set(request.bpm),
        musical_key: Set(request.key.clone()),
        tags: Set(normalize_names(&request.tags).into()),
        description: Set(request.description.clone()),
        duration: Set(request.duration),
        price: Set(request.price),
        free_mp3_enabled: Set(request.free_mp3_enabled),
        image_url: Set(String::new()),
        preview_url: Set(String::new()),
        wav_url: Set(None),
        stems_url: Set(None),
        processing_status: Set(ProcessingStatus::Processing),
        is_deleted: Set(false),
        deleted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let reconciler = LicenseReconciler::new(&txn);
    reconciler
        .apply(spec_id, plan(&[], request.licenses.clone()))
        .await?;
    let licenses = reconciler.active_options(spec_id).await?;

    let genres = genres::relink(&txn, spec_id, &normalize_names(&request.genres)).await?;

    txn.commit().await?;

    Ok(SpecResponse::from_parts(model, licenses, genres))
}
