//! Map entity (a curated collection of restaurants)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "maps")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    /// Map center
    pub lat: f64,
    pub lng: f64,
    pub icon_url: Option<String>,
    pub author: i32,
    /// JSON array of free-form tag strings
    pub tags: Json,
    /// JSON array of member restaurant place ids
    pub rest_ids: Json,
    pub created: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::Author",
        to = "super::user::Column::Id"
    )]
    Author,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Member place ids, tolerating a malformed column
    pub fn member_place_ids(&self) -> Vec<String> {
        serde_json::from_value(self.rest_ids.clone()).unwrap_or_default()
    }
}
