use common::{Category, ProcessingStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "spec")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub producer_id: Uuid,

    pub title: String,
    pub category: Category,
    pub bpm: i32,
    pub musical_key: String,
    /// JSON array of strings.
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: serde_json::Value,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub duration: i32, // in seconds
    pub price: f64,
    pub free_mp3_enabled: bool,

    /// Empty until the ingestion job completes.
    pub image_url: String,
    pub preview_url: String,
    pub wav_url: Option<String>,
    pub stems_url: Option<String>,

    pub processing_status: ProcessingStatus,

    /// Set only when the Spec had purchases at deletion time.
    pub is_deleted: bool,
    pub deleted_at: Option<DateTimeUtc>,

    #[sea_orm(has_many)]
    pub license_options: HasMany<super::license_option::Entity>,

    #[sea_orm(has_many, via = "spec_genre")]
    pub genres: HasMany<super::genre::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
