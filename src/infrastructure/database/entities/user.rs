//! User entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(unique)]
    pub email: String,
    pub avatar_url: Option<String>,
    /// Personal default map; collect-restaurant mirrors into its member set
    pub map_id: Option<i32>,
    pub created: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::map::Entity")]
    Maps,
    #[sea_orm(has_many = "super::diary::Entity")]
    Diaries,
}

impl Related<super::map::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Maps.def()
    }
}

impl Related<super::diary::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Diaries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
