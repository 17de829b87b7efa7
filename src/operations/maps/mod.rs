//! Map operations
//!
//! Maps are curated collections of restaurants. Membership lives in the
//! map row itself as a JSON array of place ids; the complete view hydrates
//! members through the restaurant listing so cards carry the same aggregate
//! counts and viewer flags as everywhere else.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Alias, Condition, Expr, Func, JoinType, Order, Query, SelectStatement};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::infrastructure::database::entities::{
    map, map_collect, user, Map, MapActive, MapCollect, MapCollectActive,
};
use crate::operations::edges::insert_edge;
use crate::operations::query::{
    direction, EngagementOrder, GeoPoint, Page, PageRequest, Scope, TotalRow,
};
use crate::operations::restaurants::{RestaurantService, SimplifiedRestaurant};
use crate::shared::{CoreError, MutationOutcome, Result, Viewer};

/// Map card for listings
#[derive(Clone, Debug, Serialize)]
pub struct SimplifiedMap {
    pub id: i32,
    pub name: String,
    pub center: GeoPoint,
    pub icon_url: Option<String>,
    pub author: i32,
    pub author_name: String,
    pub tags: Vec<String>,
    pub collect_count: u64,
    pub has_collected: bool,
}

/// Full map view, members hydrated as restaurant cards
#[derive(Clone, Debug, Serialize)]
pub struct CompleteMap {
    pub id: i32,
    pub name: String,
    pub center: GeoPoint,
    pub icon_url: Option<String>,
    pub author: i32,
    pub author_name: String,
    pub tags: Vec<String>,
    pub collect_count: u64,
    pub has_collected: bool,
    pub restaurants: Vec<SimplifiedRestaurant>,
}

/// Parameters for a map listing
#[derive(Clone, Debug)]
pub struct MapQuery {
    pub text: Option<String>,
    pub order: EngagementOrder,
    pub reverse: bool,
    pub page: PageRequest,
    pub scope: Scope,
}

impl Default for MapQuery {
    fn default() -> Self {
        Self {
            text: None,
            order: EngagementOrder::CollectCount,
            reverse: false,
            page: PageRequest::default(),
            scope: Scope::All,
        }
    }
}

/// Fields for a new map
#[derive(Clone, Debug, Deserialize)]
pub struct NewMap {
    pub name: String,
    pub center: GeoPoint,
    pub icon_url: Option<String>,
    pub tags: Vec<String>,
    pub place_ids: Vec<String>,
}

/// Partial update; unknown fields are rejected at deserialization
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapPatch {
    pub name: Option<String>,
    pub center: Option<GeoPoint>,
    pub icon_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub place_ids: Option<Vec<String>>,
}

impl MapPatch {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.center.is_none()
            && self.icon_url.is_none()
            && self.tags.is_none()
            && self.place_ids.is_none()
    }
}

#[derive(Debug, FromQueryResult)]
struct MapRow {
    id: i32,
    name: String,
    lat: f64,
    lng: f64,
    icon_url: Option<String>,
    author: i32,
    author_name: String,
    tags: serde_json::Value,
    rest_ids: serde_json::Value,
    collect_count: i64,
    has_collected: bool,
}

impl MapRow {
    fn member_place_ids(&self) -> Vec<String> {
        serde_json::from_value(self.rest_ids.clone()).unwrap_or_default()
    }

    fn into_simplified(self) -> SimplifiedMap {
        let tags = serde_json::from_value(self.tags.clone()).unwrap_or_default();
        SimplifiedMap {
            id: self.id,
            name: self.name,
            center: GeoPoint {
                lat: self.lat,
                lng: self.lng,
            },
            icon_url: self.icon_url,
            author: self.author,
            author_name: self.author_name,
            tags,
            collect_count: self.collect_count.max(0) as u64,
            has_collected: self.has_collected,
        }
    }
}

fn display_select(viewer: Viewer) -> SelectStatement {
    let collects = Alias::new("edge_collects");

    let mut stmt = Query::select();
    stmt.columns([
        (map::Entity, map::Column::Id),
        (map::Entity, map::Column::Name),
        (map::Entity, map::Column::Lat),
        (map::Entity, map::Column::Lng),
        (map::Entity, map::Column::IconUrl),
        (map::Entity, map::Column::Author),
        (map::Entity, map::Column::Tags),
        (map::Entity, map::Column::RestIds),
    ])
    .expr_as(
        Expr::col((user::Entity, user::Column::Name)),
        Alias::new("author_name"),
    )
    .expr_as(
        Func::count_distinct(Expr::col((collects.clone(), map_collect::Column::UserId))),
        Alias::new("collect_count"),
    )
    .expr_as(
        Expr::exists(
            Query::select()
                .expr(Expr::val(1))
                .from(map_collect::Entity)
                .and_where(
                    Expr::col((map_collect::Entity, map_collect::Column::UserId)).eq(viewer.id()),
                )
                .and_where(
                    Expr::col((map_collect::Entity, map_collect::Column::MapId))
                        .equals((map::Entity, map::Column::Id)),
                )
                .take(),
        ),
        Alias::new("has_collected"),
    )
    .from(map::Entity)
    .join(
        JoinType::InnerJoin,
        user::Entity,
        Expr::col((map::Entity, map::Column::Author)).equals((user::Entity, user::Column::Id)),
    )
    .join_as(
        JoinType::LeftJoin,
        map_collect::Entity,
        collects.clone(),
        Expr::col((collects, map_collect::Column::MapId)).equals((map::Entity, map::Column::Id)),
    )
    .group_by_col((map::Entity, map::Column::Id));

    stmt
}

fn apply_filters(stmt: &mut SelectStatement, text: Option<&str>, scope: &Scope) -> Result<()> {
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        stmt.and_where(
            Expr::expr(Func::lower(Expr::col((map::Entity, map::Column::Name))))
                .like(format!("%{}%", text.to_lowercase())),
        );
    }

    match scope {
        Scope::All => {}
        Scope::AuthoredBy(user_id) => {
            stmt.and_where(Expr::col((map::Entity, map::Column::Author)).eq(*user_id));
        }
        Scope::CollectedBy(user_id) => {
            let scoped = Alias::new("scoped_collects");
            stmt.join_as(
                JoinType::InnerJoin,
                map_collect::Entity,
                scoped.clone(),
                Condition::all()
                    .add(
                        Expr::col((scoped.clone(), map_collect::Column::MapId))
                            .equals((map::Entity, map::Column::Id)),
                    )
                    .add(Expr::col((scoped, map_collect::Column::UserId)).eq(*user_id)),
            );
        }
        Scope::Followees(_) => {
            return Err(CoreError::InvalidArgument(
                "maps have no followee scope".into(),
            ));
        }
    }

    Ok(())
}

pub struct MapService {
    db: Arc<DatabaseConnection>,
    restaurants: Arc<RestaurantService>,
}

impl MapService {
    pub fn new(db: Arc<DatabaseConnection>, restaurants: Arc<RestaurantService>) -> Self {
        Self { db, restaurants }
    }

    /// Aggregated map listing
    pub async fn list(&self, viewer: Viewer, query: &MapQuery) -> Result<Page<SimplifiedMap>> {
        let (offset, limit) = query.page.clamped();

        let mut count_stmt = Query::select();
        count_stmt
            .expr_as(
                Func::count_distinct(Expr::col((map::Entity, map::Column::Id))),
                Alias::new("total"),
            )
            .from(map::Entity);
        apply_filters(&mut count_stmt, query.text.as_deref(), &query.scope)?;

        let mut stmt = display_select(viewer);
        apply_filters(&mut stmt, query.text.as_deref(), &query.scope)?;
        match query.order {
            EngagementOrder::CollectCount => {
                stmt.order_by_expr(
                    Expr::col(Alias::new("collect_count")).into(),
                    direction(query.reverse),
                );
            }
            EngagementOrder::CreateTime => {
                stmt.order_by((map::Entity, map::Column::Created), direction(query.reverse));
            }
        }
        stmt.order_by((map::Entity, map::Column::Id), Order::Asc)
            .limit(limit)
            .offset(offset);

        let backend = self.db.get_database_backend();
        let (total_row, rows) = futures::try_join!(
            TotalRow::find_by_statement(backend.build(&count_stmt)).one(&*self.db),
            MapRow::find_by_statement(backend.build(&stmt)).all(&*self.db),
        )?;

        Ok(Page {
            total: total_row.map(|row| row.total.max(0) as u64).unwrap_or(0),
            items: rows.into_iter().map(MapRow::into_simplified).collect(),
        })
    }

    /// Complete map view with members hydrated as restaurant cards
    pub async fn get(&self, viewer: Viewer, map_id: i32) -> Result<CompleteMap> {
        let mut stmt = display_select(viewer);
        stmt.and_where(Expr::col((map::Entity, map::Column::Id)).eq(map_id));

        let backend = self.db.get_database_backend();
        let row = MapRow::find_by_statement(backend.build(&stmt))
            .one(&*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("map {map_id}")))?;

        let members = row.member_place_ids();
        let restaurants = self.restaurants.list_by_place_ids(viewer, &members).await?;
        let simplified = row.into_simplified();

        Ok(CompleteMap {
            id: simplified.id,
            name: simplified.name,
            center: simplified.center,
            icon_url: simplified.icon_url,
            author: simplified.author,
            author_name: simplified.author_name,
            tags: simplified.tags,
            collect_count: simplified.collect_count,
            has_collected: simplified.has_collected,
            restaurants,
        })
    }

    pub async fn create(&self, viewer: Viewer, new_map: NewMap) -> Result<i32> {
        let user_id = viewer.require()?;
        if new_map.name.trim().is_empty() {
            return Err(CoreError::InvalidArgument("map name must not be empty".into()));
        }

        let created = MapActive {
            name: Set(new_map.name),
            lat: Set(new_map.center.lat),
            lng: Set(new_map.center.lng),
            icon_url: Set(new_map.icon_url),
            author: Set(user_id),
            tags: Set(serde_json::to_value(&new_map.tags)?),
            rest_ids: Set(serde_json::to_value(&new_map.place_ids)?),
            created: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(map_id = created.id, author = user_id, "created map");
        Ok(created.id)
    }

    /// Apply a partial update. Only the author may modify a map.
    pub async fn update(
        &self,
        viewer: Viewer,
        map_id: i32,
        patch: MapPatch,
    ) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        if patch.is_empty() {
            return Err(CoreError::InvalidArgument("empty patch".into()));
        }

        let existing = Map::find_by_id(map_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("map {map_id}")))?;
        if existing.author != user_id {
            return Err(CoreError::Forbidden(format!(
                "user {user_id} does not own map {map_id}"
            )));
        }

        let mut active: map::ActiveModel = existing.into();
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(CoreError::InvalidArgument("map name must not be empty".into()));
            }
            active.name = Set(name);
        }
        if let Some(center) = patch.center {
            active.lat = Set(center.lat);
            active.lng = Set(center.lng);
        }
        if let Some(icon_url) = patch.icon_url {
            active.icon_url = Set(Some(icon_url));
        }
        if let Some(tags) = patch.tags {
            active.tags = Set(serde_json::to_value(&tags)?);
        }
        if let Some(place_ids) = patch.place_ids {
            active.rest_ids = Set(serde_json::to_value(&place_ids)?);
        }
        active.update(&*self.db).await?;

        Ok(MutationOutcome::ok(format!("map {map_id} updated")))
    }

    /// Delete a map and its collect edges. Only the author may delete.
    pub async fn delete(&self, viewer: Viewer, map_id: i32) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;

        let existing = Map::find_by_id(map_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("map {map_id}")))?;
        if existing.author != user_id {
            return Err(CoreError::Forbidden(format!(
                "user {user_id} does not own map {map_id}"
            )));
        }

        let txn = self.db.begin().await?;
        MapCollect::delete_many()
            .filter(map_collect::Column::MapId.eq(map_id))
            .exec(&txn)
            .await?;
        Map::delete_by_id(map_id).exec(&txn).await?;
        txn.commit().await?;

        info!(map_id, "deleted map");
        Ok(MutationOutcome::ok(format!("map {map_id} deleted")))
    }

    pub async fn collect(&self, viewer: Viewer, map_id: i32) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        Map::find_by_id(map_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("map {map_id}")))?;

        let already = MapCollect::find()
            .filter(map_collect::Column::UserId.eq(user_id))
            .filter(map_collect::Column::MapId.eq(map_id))
            .one(&*self.db)
            .await?
            .is_some();
        if !already {
            insert_edge(
                &*self.db,
                MapCollectActive {
                    user_id: Set(user_id),
                    map_id: Set(map_id),
                    ..Default::default()
                },
            )
            .await?;
        }

        Ok(MutationOutcome::ok(format!(
            "user {user_id} has collected map {map_id}"
        )))
    }

    pub async fn uncollect(&self, viewer: Viewer, map_id: i32) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        MapCollect::delete_many()
            .filter(map_collect::Column::UserId.eq(user_id))
            .filter(map_collect::Column::MapId.eq(map_id))
            .exec(&*self.db)
            .await?;
        Ok(MutationOutcome::ok(format!(
            "user {user_id} has uncollected map {map_id}"
        )))
    }

    /// Map created automatically at first login; becomes the user's default
    /// collect target
    pub async fn create_default_for(&self, user_id: i32, user_name: &str) -> Result<i32> {
        let created = MapActive {
            name: Set(format!("{user_name}'s collects")),
            lat: Set(0.0),
            lng: Set(0.0),
            icon_url: Set(None),
            author: Set(user_id),
            tags: Set(serde_json::json!([])),
            rest_ids: Set(serde_json::json!([])),
            created: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        Ok(created.id)
    }
}
