use common::LicenseType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "license_option")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub spec_id: Uuid,
    #[sea_orm(belongs_to, from = "spec_id", to = "id")]
    pub spec: HasOne<super::spec::Entity>,

    pub license_type: LicenseType,
    pub name: String,
    pub price: f64,
    /// JSON array of feature strings.
    #[sea_orm(column_type = "JsonBinary")]
    pub features: serde_json::Value,
    /// JSON array of deliverable file types, e.g. `["mp3", "wav"]`.
    #[sea_orm(column_type = "JsonBinary")]
    pub file_types: serde_json::Value,

    /// Retired options that still back a purchase stay as soft-deleted rows.
    pub is_deleted: bool,

    #[sea_orm(has_many)]
    pub purchases: HasMany<super::purchase::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
