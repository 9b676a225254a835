use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entity::{license_option, purchase};
use crate::models::spec::LicenseOptionInput;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("license reconciliation failed: {0}")]
    Database(#[from] DbErr),
}

/// One row-level step of a reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub enum LicenseOperation {
    /// New option; an id is assigned on insert.
    Insert(LicenseOptionInput),
    /// Active option whose fields changed.
    Update(Uuid, LicenseOptionInput),
    /// Active option resubmitted with identical fields.
    Keep(Uuid),
    /// Id not among the active options: update it (reactivating a soft-deleted
    /// row), or insert it under that id if no row exists.
    UpdateOrInsert(Uuid, LicenseOptionInput),
    /// Active option missing from the incoming list.
    Retire(Uuid),
}

/// Row counts produced by [`LicenseReconciler::apply`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub soft_deleted: usize,
    pub hard_deleted: usize,
}

impl ReconcileSummary {
    pub fn changed_rows(&self) -> usize {
        self.inserted + self.updated + self.soft_deleted + self.hard_deleted
    }
}

/// Compute the operations that turn `existing_active` into `incoming`.
///
/// Options without an id adopt the id of the first active option of the same
/// type. Retirements come last, ordered by id string.
pub fn plan(
    existing_active: &[license_option::Model],
    incoming: Vec<LicenseOptionInput>,
) -> Vec<LicenseOperation> {
    let mut by_id: HashMap<Uuid, &license_option::Model> = HashMap::new();
    let mut by_type = HashMap::new();
    for option in existing_active {
        by_id.insert(option.id, option);
        by_type.entry(option.license_type).or_insert(option.id);
    }

    let mut processed = HashSet::new();
    let mut ops = Vec::with_capacity(incoming.len() + existing_active.len());

    for mut input in incoming {
        if input.id.is_none() {
            input.id = by_type.get(&input.license_type).copied();
        }

        let Some(id) = input.id else {
            ops.push(LicenseOperation::Insert(input));
            continue;
        };

        processed.insert(id);
        match by_id.get(&id) {
            Some(current) if same_fields(current, &input) => ops.push(LicenseOperation::Keep(id)),
            Some(_) => ops.push(LicenseOperation::Update(id, input)),
            None => ops.push(LicenseOperation::UpdateOrInsert(id, input)),
        }
    }

    let mut retired: Vec<Uuid> = existing_active
        .iter()
        .map(|o| o.id)
        .filter(|id| !processed.contains(id))
        .collect();
    retired.sort_by_key(|id| id.to_string());
    retired.dedup();
    ops.extend(retired.into_iter().map(LicenseOperation::Retire));

    ops
}

fn same_fields(current: &license_option::Model, input: &LicenseOptionInput) -> bool {
    current.license_type == input.license_type
        && current.name == input.name
        && current.price == input.price
        && current.features == serde_json::Value::from(input.features.clone())
        && current.file_types == serde_json::Value::from(input.file_types.clone())
}

/// Merges a submitted license list into the persisted options of one Spec.
/// Meant to run on the Update transaction.
pub struct LicenseReconciler<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> LicenseReconciler<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Active (not soft-deleted) options of a Spec in creation order.
    pub async fn active_options(&self, spec_id: Uuid) -> Result<Vec<license_option::Model>, DbErr> {
        license_option::Entity::find()
            .filter(license_option::Column::SpecId.eq(spec_id))
            .filter(license_option::Column::IsDeleted.eq(false))
            .order_by_asc(license_option::Column::CreatedAt)
            .order_by_asc(license_option::Column::Id)
            .all(self.conn)
            .await
    }

    /// Load the active options, plan against `incoming` and apply the plan.
    #[instrument(skip(self, incoming), fields(incoming = incoming.len()))]
    pub async fn reconcile(
        &self,
        spec_id: Uuid,
        incoming: Vec<LicenseOptionInput>,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let existing = self.active_options(spec_id).await?;
        let ops = plan(&existing, incoming);
        let summary = self.apply(spec_id, ops).await?;
        debug!(?summary, changed = summary.changed_rows(), "Reconciled license options");
        Ok(summary)
    }

    pub async fn apply(
        &self,
        spec_id: Uuid,
        ops: Vec<LicenseOperation>,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let mut summary = ReconcileSummary::default();

        for op in ops {
            match op {
                LicenseOperation::Insert(input) => {
                    self.insert(spec_id, Uuid::now_v7(), input).await?;
                    summary.inserted += 1;
                }
                LicenseOperation::Update(id, input) => {
                    self.update(spec_id, id, input).await?;
                    summary.updated += 1;
                }
                LicenseOperation::Keep(_) => summary.unchanged += 1,
                LicenseOperation::UpdateOrInsert(id, input) => {
                    if self.update(spec_id, id, input.clone()).await? == 0 {
                        self.insert(spec_id, id, input).await?;
                        summary.inserted += 1;
                    } else {
                        summary.updated += 1;
                    }
                }
                LicenseOperation::Retire(id) => {
                    if self.retire(id).await? {
                        summary.soft_deleted += 1;
                    } else {
                        summary.hard_deleted += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Insert a new option row for `spec_id`.
    pub async fn insert(
        &self,
        spec_id: Uuid,
        id: Uuid,
        input: LicenseOptionInput,
    ) -> Result<license_option::Model, DbErr> {
        let now = Utc::now();
        license_option::ActiveModel {
            id: Set(id),
            spec_id: Set(spec_id),
            license_type: Set(input.license_type),
            name: Set(input.name),
            price: Set(input.price),
            features: Set(input.features.into()),
            file_types: Set(input.file_types.into()),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.conn)
        .await
    }

    /// Overwrite an option's fields and clear its soft-delete flag.
    /// Returns the number of affected rows.
    async fn update(&self, spec_id: Uuid, id: Uuid, input: LicenseOptionInput) -> Result<u64, DbErr> {
        let result = license_option::Entity::update_many()
            .col_expr(license_option::Column::LicenseType, Expr::value(input.license_type))
            .col_expr(license_option::Column::Name, Expr::value(input.name))
            .col_expr(license_option::Column::Price, Expr::value(input.price))
            .col_expr(
                license_option::Column::Features,
                Expr::value(serde_json::Value::from(input.features)),
            )
            .col_expr(
                license_option::Column::FileTypes,
                Expr::value(serde_json::Value::from(input.file_types)),
            )
            .col_expr(license_option::Column::IsDeleted, Expr::value(false))
            .col_expr(license_option::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(license_option::Column::Id.eq(id))
            .filter(license_option::Column::SpecId.eq(spec_id))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Soft-delete a purchased option, hard-delete an unpurchased one.
    /// Returns `true` for a soft delete.
    async fn retire(&self, id: Uuid) -> Result<bool, DbErr> {
        let purchases = purchase::Entity::find()
            .filter(purchase::Column::LicenseOptionId.eq(id))
            .count(self.conn)
            .await?;

        if purchases > 0 {
            license_option::Entity::update_many()
                .col_expr(license_option::Column::IsDeleted, Expr::value(true))
                .col_expr(license_option::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(license_option::Column::Id.eq(id))
                .exec(self.conn)
                .await?;
            debug!(%id, purchases, "Soft-deleted purchased license option");
            Ok(true)
        } else {
            license_option::Entity::delete_by_id(id)
                .exec(self.conn)
                .await?;
            Ok(false)
        }
    }
}
