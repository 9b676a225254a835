use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Issued license. Rows are written by the order module; this service only
/// reads them to decide between hard and soft deletes.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub license_option_id: Uuid,
    #[sea_orm(belongs_to, from = "license_option_id", to = "id")]
    pub license_option: HasOne<super::license_option::Entity>,

    /// Denormalized so Spec deletion can count issued licenses without a JOIN.
    pub spec_id: Uuid,

    pub buyer_id: Uuid,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
