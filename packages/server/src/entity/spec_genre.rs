use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "spec_genre")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub spec_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub genre_id: i32,
    #[sea_orm(belongs_to, from = "spec_id", to = "id")]
    pub spec: HasOne<super::spec::Entity>,
    #[sea_orm(belongs_to, from = "genre_id", to = "id")]
    pub genre: HasOne<super::genre::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
