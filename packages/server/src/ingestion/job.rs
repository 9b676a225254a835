use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use common::storage::ObjectStore;
use common::{Category, ProcessingStatus};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::compensation::{RollbackReport, delete_objects};
use super::media::{MediaError, MediaProcessor};
use super::role::FileRole;
use super::staging::StagedFiles;
use crate::cache::SpecCache;
use crate::entity::spec;
use crate::notifications::{NotificationSink, Severity, notify_best_effort};

/// Shared dependencies of every ingestion job.
pub struct IngestionContext {
    pub db: DatabaseConnection,
    pub store: Arc<dyn ObjectStore>,
    pub processor: MediaProcessor,
    pub cache: SpecCache,
    pub notifier: Arc<dyn NotificationSink>,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{role:?} upload failed: {source}")]
    Media {
        role: FileRole,
        #[source]
        source: MediaError,
    },

    #[error("required {0:?} file was not uploaded")]
    MissingRequired(FileRole),

    #[error("failed to persist media URLs: {0}")]
    Persist(#[from] DbErr),

    #[error("spec is no longer processing")]
    NotProcessing,
}

/// Terminal state of one job.
#[derive(Debug)]
pub enum JobOutcome {
    Succeeded {
        /// Persisted URLs keyed by spec column name.
        urls: BTreeMap<&'static str, String>,
    },
    Failed {
        reason: String,
        rollback: RollbackReport,
    },
}

/// Background work scheduled by a successful Create.
#[derive(Debug)]
pub struct IngestionJob {
    pub spec_id: Uuid,
    pub producer_id: Uuid,
    /// Used in notification text.
    pub title: String,
    pub category: Category,
    pub staged: StagedFiles,
}

/// Objects uploaded so far by one job.
#[derive(Default)]
struct Uploads {
    keys: Vec<String>,
    urls: BTreeMap<FileRole, String>,
}

impl IngestionJob {
    /// Upload every staged file, then either finalize the Spec as completed
    /// or roll back and mark it failed. Staged files are always removed.
    #[instrument(skip(self, ctx), fields(spec_id = %self.spec_id, producer_id = %self.producer_id))]
    pub async fn run(self, ctx: Arc<IngestionContext>) -> JobOutcome {
        let IngestionJob {
            spec_id,
            producer_id,
            title,
            category,
            staged,
        } = self;

        let mut uploads = Uploads::default();

        let result = match upload_all(&ctx.processor, &staged, &mut uploads).await {
            Ok(()) => match check_required(category, &uploads) {
                Ok(()) => finalize(&ctx.db, spec_id, &uploads).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(()) => {
                ctx.cache.invalidate(spec_id).await;
                notify_best_effort(
                    &*ctx.notifier,
                    producer_id,
                    "Spec published",
                    &format!("\"{title}\" finished processing and is now live."),
                    Severity::Success,
                )
                .await;
                info!(files = uploads.urls.len(), "Ingestion completed");

                JobOutcome::Succeeded {
                    urls: uploads
                        .urls
                        .into_iter()
                        .map(|(role, url)| (role.spec().url_field, url))
                        .collect(),
                }
            }
            Err(e) => {
                error!(error = %e, "Ingestion failed, rolling back");
                let rollback = compensate(&ctx, spec_id, &uploads.keys).await;
                notify_best_effort(
                    &*ctx.notifier,
                    producer_id,
                    "Spec processing failed",
                    &format!("\"{title}\" could not be processed. Please upload it again."),
                    Severity::Error,
                )
                .await;

                JobOutcome::Failed {
                    reason: e.to_string(),
                    rollback,
                }
            }
        };

        staged.cleanup().await;
        outcome
    }
}

/// Upload staged files in role order, stopping at the first error.
async fn upload_all(
    processor: &MediaProcessor,
    staged: &StagedFiles,
    uploads: &mut Uploads,
) -> Result<(), JobError> {
    for (role, file) in staged.iter() {
        let stored = processor
            .process(role, file)
            .await
            .map_err(|source| JobError::Media { role, source })?;
        uploads.keys.push(stored.key);
        uploads.urls.insert(role, stored.url);
    }
    Ok(())
}

fn check_required(category: Category, uploads: &Uploads) -> Result<(), JobError> {
    for role in FileRole::required_for(category) {
        if !uploads.urls.contains_key(role) {
            return Err(JobError::MissingRequired(*role));
        }
    }
    Ok(())
}

/// Write every URL and `completed` in a single conditional UPDATE.
async fn finalize(
    db: &DatabaseConnection,
    spec_id: Uuid,
    uploads: &Uploads,
) -> Result<(), JobError> {
    let mut update = spec::Entity::update_many()
        .col_expr(
            spec::Column::ProcessingStatus,
            Expr::value(ProcessingStatus::Completed),
        )
        .col_expr(spec::Column::UpdatedAt, Expr::value(Utc::now()));

    for (role, url) in &uploads.urls {
        update = update.col_expr(role.column(), Expr::value(url.clone()));
    }

    let result = update
        .filter(spec::Column::Id.eq(spec_id))
        .filter(
            spec::Column::ProcessingStatus
                .is_in(ProcessingStatus::predecessors_of(ProcessingStatus::Completed)),
        )
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(JobError::NotProcessing);
    }
    Ok(())
}

/// Delete uploaded objects, mark the Spec failed, then invalidate its cache entry.
async fn compensate(ctx: &IngestionContext, spec_id: Uuid, keys: &[String]) -> RollbackReport {
    let rollback = delete_objects(&*ctx.store, keys).await;
    if !rollback.is_clean() {
        warn!(
            failed = rollback.failed.len(),
            "Rollback left orphaned objects in storage"
        );
    }

    let marked = spec::Entity::update_many()
        .col_expr(
            spec::Column::ProcessingStatus,
            Expr::value(ProcessingStatus::Failed),
        )
        .col_expr(spec::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(spec::Column::Id.eq(spec_id))
        .filter(
            spec::Column::ProcessingStatus
                .is_in(ProcessingStatus::predecessors_of(ProcessingStatus::Failed)),
        )
        .exec(&ctx.db)
        .await;

    match marked {
        Ok(result) if result.rows_affected == 0 => {
            warn!("Spec can no longer be marked failed, status left unchanged");
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to mark spec as failed"),
    }

    ctx.cache.invalidate(spec_id).await;
    rollback
}
