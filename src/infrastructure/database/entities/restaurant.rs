//! Restaurant entity, keyed by the external place id

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "restaurants")]
pub struct Model {
    /// Opaque identifier from the external places provider
    #[sea_orm(primary_key, auto_increment = false)]
    pub place_id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub rating: f64,
    pub user_ratings_total: Option<i32>,
    pub address: Option<String>,
    pub telephone: Option<String>,
    pub photo_url: Option<String>,
    /// JSON array of category tags from the places provider
    pub types: Json,
    pub price_level: Option<i32>,
    pub created: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::diary::Entity")]
    Diaries,
}

impl Related<super::diary::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Diaries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
