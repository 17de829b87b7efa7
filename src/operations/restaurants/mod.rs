//! Restaurant operations
//!
//! Aggregated listings join the restaurant table with each edge table in a
//! single grouped pass: one COUNT(DISTINCT user_id) per edge kind plus one
//! EXISTS flag per edge kind for the current viewer. Toggles (collect, like,
//! dislike) are idempotent; like and dislike share a combined state machine
//! and the swap runs in one transaction. Collecting a restaurant mirrors the
//! place id into the viewer's personal default map.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{
    Alias, Condition, Expr, Func, JoinType, OnConflict, Order, Query, SelectStatement,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    FromQueryResult, QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::debug;

use crate::infrastructure::database::entities::{
    map, rest_collect, rest_dislike, rest_like, restaurant, Map, Restaurant, RestCollect,
    RestCollectActive, RestDislike, RestDislikeActive, RestLike, RestLikeActive, RestaurantActive,
    User,
};
use crate::infrastructure::places::{PlaceCandidate, PlaceDetails, PlacesService};
use crate::operations::edges::insert_edge;
use crate::operations::query::{
    direction, BoundingBox, EngagementOrder, GeoPoint, Page, PageRequest, Scope, TotalRow,
};
use crate::shared::{CoreError, MutationOutcome, Result, Viewer};

/// Restaurant card for listings
#[derive(Clone, Debug, Serialize)]
pub struct SimplifiedRestaurant {
    pub place_id: String,
    pub name: String,
    pub location: GeoPoint,
    pub address: Option<String>,
    pub telephone: Option<String>,
    pub rating: f64,
    pub collect_count: u64,
    pub like_count: u64,
    pub dislike_count: u64,
    pub has_collected: bool,
    pub has_liked: bool,
    pub has_disliked: bool,
}

/// Full restaurant view for the detail page
#[derive(Clone, Debug, Serialize)]
pub struct CompleteRestaurant {
    pub place_id: String,
    pub name: String,
    pub location: GeoPoint,
    pub address: Option<String>,
    pub telephone: Option<String>,
    pub rating: f64,
    pub photo_url: Option<String>,
    pub types: Vec<String>,
    pub price_level: Option<i32>,
    pub collect_count: u64,
    pub like_count: u64,
    pub dislike_count: u64,
    pub has_collected: bool,
    pub has_liked: bool,
    pub has_disliked: bool,
}

/// Parameters for a restaurant listing
#[derive(Clone, Debug)]
pub struct RestaurantQuery {
    pub text: Option<String>,
    pub order: EngagementOrder,
    pub reverse: bool,
    pub page: PageRequest,
    pub bounds: Option<BoundingBox>,
    pub scope: Scope,
}

impl Default for RestaurantQuery {
    fn default() -> Self {
        Self {
            text: None,
            order: EngagementOrder::CollectCount,
            reverse: false,
            page: PageRequest::default(),
            bounds: None,
            scope: Scope::All,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct RestaurantRow {
    place_id: String,
    name: String,
    lat: f64,
    lng: f64,
    rating: f64,
    address: Option<String>,
    telephone: Option<String>,
    photo_url: Option<String>,
    types: serde_json::Value,
    price_level: Option<i32>,
    collect_count: i64,
    like_count: i64,
    dislike_count: i64,
    has_collected: bool,
    has_liked: bool,
    has_disliked: bool,
}

impl RestaurantRow {
    fn into_simplified(self) -> SimplifiedRestaurant {
        SimplifiedRestaurant {
            place_id: self.place_id,
            name: self.name,
            location: GeoPoint {
                lat: self.lat,
                lng: self.lng,
            },
            address: self.address,
            telephone: self.telephone,
            rating: self.rating,
            collect_count: self.collect_count.max(0) as u64,
            like_count: self.like_count.max(0) as u64,
            dislike_count: self.dislike_count.max(0) as u64,
            has_collected: self.has_collected,
            has_liked: self.has_liked,
            has_disliked: self.has_disliked,
        }
    }

    fn into_complete(self) -> CompleteRestaurant {
        let types = serde_json::from_value(self.types.clone()).unwrap_or_default();
        CompleteRestaurant {
            place_id: self.place_id,
            name: self.name,
            location: GeoPoint {
                lat: self.lat,
                lng: self.lng,
            },
            address: self.address,
            telephone: self.telephone,
            rating: self.rating,
            photo_url: self.photo_url,
            types,
            price_level: self.price_level,
            collect_count: self.collect_count.max(0) as u64,
            like_count: self.like_count.max(0) as u64,
            dislike_count: self.dislike_count.max(0) as u64,
            has_collected: self.has_collected,
            has_liked: self.has_liked,
            has_disliked: self.has_disliked,
        }
    }
}

/// Grouped select producing one row per restaurant with aggregate counts and
/// viewer flags
fn display_select(viewer: Viewer) -> SelectStatement {
    let collects = Alias::new("edge_collects");
    let likes = Alias::new("edge_likes");
    let dislikes = Alias::new("edge_dislikes");

    let mut stmt = Query::select();
    stmt.columns([
        (restaurant::Entity, restaurant::Column::PlaceId),
        (restaurant::Entity, restaurant::Column::Name),
        (restaurant::Entity, restaurant::Column::Lat),
        (restaurant::Entity, restaurant::Column::Lng),
        (restaurant::Entity, restaurant::Column::Rating),
        (restaurant::Entity, restaurant::Column::Address),
        (restaurant::Entity, restaurant::Column::Telephone),
        (restaurant::Entity, restaurant::Column::PhotoUrl),
        (restaurant::Entity, restaurant::Column::Types),
        (restaurant::Entity, restaurant::Column::PriceLevel),
    ])
    .expr_as(
        Func::count_distinct(Expr::col((collects.clone(), rest_collect::Column::UserId))),
        Alias::new("collect_count"),
    )
    .expr_as(
        Func::count_distinct(Expr::col((likes.clone(), rest_like::Column::UserId))),
        Alias::new("like_count"),
    )
    .expr_as(
        Func::count_distinct(Expr::col((dislikes.clone(), rest_dislike::Column::UserId))),
        Alias::new("dislike_count"),
    )
    .expr_as(
        Expr::exists(
            Query::select()
                .expr(Expr::val(1))
                .from(rest_collect::Entity)
                .and_where(
                    Expr::col((rest_collect::Entity, rest_collect::Column::UserId))
                        .eq(viewer.id()),
                )
                .and_where(
                    Expr::col((rest_collect::Entity, rest_collect::Column::RestId))
                        .equals((restaurant::Entity, restaurant::Column::PlaceId)),
                )
                .take(),
        ),
        Alias::new("has_collected"),
    )
    .expr_as(
        Expr::exists(
            Query::select()
                .expr(Expr::val(1))
                .from(rest_like::Entity)
                .and_where(
                    Expr::col((rest_like::Entity, rest_like::Column::UserId)).eq(viewer.id()),
                )
                .and_where(
                    Expr::col((rest_like::Entity, rest_like::Column::RestId))
                        .equals((restaurant::Entity, restaurant::Column::PlaceId)),
                )
                .take(),
        ),
        Alias::new("has_liked"),
    )
    .expr_as(
        Expr::exists(
            Query::select()
                .expr(Expr::val(1))
                .from(rest_dislike::Entity)
                .and_where(
                    Expr::col((rest_dislike::Entity, rest_dislike::Column::UserId))
                        .eq(viewer.id()),
                )
                .and_where(
                    Expr::col((rest_dislike::Entity, rest_dislike::Column::RestId))
                        .equals((restaurant::Entity, restaurant::Column::PlaceId)),
                )
                .take(),
        ),
        Alias::new("has_disliked"),
    )
    .from(restaurant::Entity)
    .join_as(
        JoinType::LeftJoin,
        rest_collect::Entity,
        collects.clone(),
        Expr::col((collects, rest_collect::Column::RestId))
            .equals((restaurant::Entity, restaurant::Column::PlaceId)),
    )
    .join_as(
        JoinType::LeftJoin,
        rest_like::Entity,
        likes.clone(),
        Expr::col((likes, rest_like::Column::RestId))
            .equals((restaurant::Entity, restaurant::Column::PlaceId)),
    )
    .join_as(
        JoinType::LeftJoin,
        rest_dislike::Entity,
        dislikes.clone(),
        Expr::col((dislikes, rest_dislike::Column::RestId))
            .equals((restaurant::Entity, restaurant::Column::PlaceId)),
    )
    .group_by_col((restaurant::Entity, restaurant::Column::PlaceId));

    stmt
}

/// Apply text, geographic and scope filters; shared between the display
/// select and the parallel count select
fn apply_filters(
    stmt: &mut SelectStatement,
    text: Option<&str>,
    bounds: Option<&BoundingBox>,
    scope: &Scope,
) -> Result<()> {
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        stmt.and_where(
            Expr::expr(Func::lower(Expr::col((
                restaurant::Entity,
                restaurant::Column::Name,
            ))))
            .like(format!("%{}%", text.to_lowercase())),
        );
    }

    if let Some(bounds) = bounds {
        // Inclusive per-axis range check, not geodesic containment
        stmt.and_where(
            Expr::col((restaurant::Entity, restaurant::Column::Lat))
                .between(bounds.south, bounds.north),
        );
        stmt.and_where(
            Expr::col((restaurant::Entity, restaurant::Column::Lng))
                .between(bounds.west, bounds.east),
        );
    }

    match scope {
        Scope::All => {}
        Scope::CollectedBy(user_id) => {
            let scoped = Alias::new("scoped_collects");
            stmt.join_as(
                JoinType::InnerJoin,
                rest_collect::Entity,
                scoped.clone(),
                Condition::all()
                    .add(
                        Expr::col((scoped.clone(), rest_collect::Column::RestId))
                            .equals((restaurant::Entity, restaurant::Column::PlaceId)),
                    )
                    .add(Expr::col((scoped, rest_collect::Column::UserId)).eq(*user_id)),
            );
        }
        Scope::Followees(_) | Scope::AuthoredBy(_) => {
            return Err(CoreError::InvalidArgument(
                "restaurants have no author scope".into(),
            ));
        }
    }

    Ok(())
}

pub struct RestaurantService {
    db: Arc<DatabaseConnection>,
    places: Arc<PlacesService>,
}

impl RestaurantService {
    pub fn new(db: Arc<DatabaseConnection>, places: Arc<PlacesService>) -> Self {
        Self { db, places }
    }

    /// Aggregated restaurant listing
    pub async fn list(
        &self,
        viewer: Viewer,
        query: &RestaurantQuery,
    ) -> Result<Page<SimplifiedRestaurant>> {
        if let Some(bounds) = &query.bounds {
            bounds.validate()?;
        }
        let (offset, limit) = query.page.clamped();

        // Total over the filtered-but-unpaginated set; count-distinct on the
        // pk so the scope join cannot inflate it
        let mut count_stmt = Query::select();
        count_stmt
            .expr_as(
                Func::count_distinct(Expr::col((
                    restaurant::Entity,
                    restaurant::Column::PlaceId,
                ))),
                Alias::new("total"),
            )
            .from(restaurant::Entity);
        apply_filters(
            &mut count_stmt,
            query.text.as_deref(),
            query.bounds.as_ref(),
            &query.scope,
        )?;

        let mut stmt = display_select(viewer);
        apply_filters(
            &mut stmt,
            query.text.as_deref(),
            query.bounds.as_ref(),
            &query.scope,
        )?;
        match query.order {
            EngagementOrder::CollectCount => {
                stmt.order_by_expr(
                    Expr::col(Alias::new("collect_count")).into(),
                    direction(query.reverse),
                );
            }
            EngagementOrder::CreateTime => {
                stmt.order_by(
                    (restaurant::Entity, restaurant::Column::Created),
                    direction(query.reverse),
                );
            }
        }
        stmt.order_by(
            (restaurant::Entity, restaurant::Column::PlaceId),
            Order::Asc,
        )
        .limit(limit)
        .offset(offset);

        let backend = self.db.get_database_backend();
        let (total_row, rows) = futures::try_join!(
            TotalRow::find_by_statement(backend.build(&count_stmt)).one(&*self.db),
            RestaurantRow::find_by_statement(backend.build(&stmt)).all(&*self.db),
        )?;

        Ok(Page {
            total: total_row.map(|row| row.total.max(0) as u64).unwrap_or(0),
            items: rows
                .into_iter()
                .map(RestaurantRow::into_simplified)
                .collect(),
        })
    }

    /// Aggregated views for an explicit id set, used to hydrate map members
    pub async fn list_by_place_ids(
        &self,
        viewer: Viewer,
        place_ids: &[String],
    ) -> Result<Vec<SimplifiedRestaurant>> {
        if place_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = display_select(viewer);
        stmt.and_where(
            Expr::col((restaurant::Entity, restaurant::Column::PlaceId))
                .is_in(place_ids.iter().cloned()),
        )
        .order_by(
            (restaurant::Entity, restaurant::Column::PlaceId),
            Order::Asc,
        );

        let backend = self.db.get_database_backend();
        let rows = RestaurantRow::find_by_statement(backend.build(&stmt))
            .all(&*self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(RestaurantRow::into_simplified)
            .collect())
    }

    /// Complete view for one restaurant. A miss in the store falls through
    /// to the places provider and warms the row before retrying.
    pub async fn get(&self, viewer: Viewer, place_id: &str) -> Result<CompleteRestaurant> {
        if let Some(found) = self.fetch_complete(viewer, place_id).await? {
            return Ok(found);
        }

        let details = self
            .places
            .details(place_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("restaurant {place_id}")))?;
        self.upsert_details(&details).await?;
        debug!(%place_id, "warmed restaurant from places provider");

        self.fetch_complete(viewer, place_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("restaurant {place_id}")))
    }

    async fn fetch_complete(
        &self,
        viewer: Viewer,
        place_id: &str,
    ) -> Result<Option<CompleteRestaurant>> {
        let mut stmt = display_select(viewer);
        stmt.and_where(
            Expr::col((restaurant::Entity, restaurant::Column::PlaceId)).eq(place_id),
        );

        let backend = self.db.get_database_backend();
        let row = RestaurantRow::find_by_statement(backend.build(&stmt))
            .one(&*self.db)
            .await?;
        Ok(row.map(RestaurantRow::into_complete))
    }

    /// Bulk insert-or-update keyed by place id; one statement for the whole
    /// candidate set
    pub async fn upsert_candidates(&self, candidates: &[PlaceCandidate]) -> Result<u64> {
        if candidates.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut models = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            models.push(RestaurantActive {
                place_id: Set(candidate.place_id.clone()),
                name: Set(candidate.name.clone()),
                lat: Set(candidate.lat),
                lng: Set(candidate.lng),
                rating: Set(candidate.rating),
                user_ratings_total: Set(candidate.user_ratings_total),
                types: Set(serde_json::to_value(&candidate.types)?),
                price_level: Set(candidate.price_level),
                photo_url: Set(candidate.photo_url.clone()),
                address: Set(None),
                telephone: Set(None),
                created: Set(now),
                ..Default::default()
            });
        }

        let inserted = Restaurant::insert_many(models)
            .on_conflict(
                OnConflict::column(restaurant::Column::PlaceId)
                    .update_columns([
                        restaurant::Column::Name,
                        restaurant::Column::Lat,
                        restaurant::Column::Lng,
                        restaurant::Column::Rating,
                        restaurant::Column::UserRatingsTotal,
                        restaurant::Column::Types,
                        restaurant::Column::PriceLevel,
                        restaurant::Column::PhotoUrl,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        Ok(inserted)
    }

    async fn upsert_details(&self, details: &PlaceDetails) -> Result<()> {
        let model = RestaurantActive {
            place_id: Set(details.place_id.clone()),
            name: Set(details.name.clone()),
            lat: Set(details.lat),
            lng: Set(details.lng),
            rating: Set(details.rating),
            address: Set(details.address.clone()),
            telephone: Set(details.telephone.clone()),
            photo_url: Set(details.photo_url.clone()),
            types: Set(serde_json::Value::Array(Vec::new())),
            user_ratings_total: Set(None),
            price_level: Set(None),
            created: Set(Utc::now()),
            ..Default::default()
        };

        Restaurant::insert(model)
            .on_conflict(
                OnConflict::column(restaurant::Column::PlaceId)
                    .update_columns([
                        restaurant::Column::Name,
                        restaurant::Column::Lat,
                        restaurant::Column::Lng,
                        restaurant::Column::Rating,
                        restaurant::Column::Address,
                        restaurant::Column::Telephone,
                        restaurant::Column::PhotoUrl,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        Ok(())
    }

    /// Collect toggle. Mirrors the place id into the viewer's default map
    /// inside the same transaction.
    pub async fn collect(&self, viewer: Viewer, place_id: &str) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        ensure_restaurant(&*self.db, place_id).await?;

        let txn = self.db.begin().await?;
        let already = RestCollect::find()
            .filter(rest_collect::Column::UserId.eq(user_id))
            .filter(rest_collect::Column::RestId.eq(place_id))
            .one(&txn)
            .await?
            .is_some();
        if !already {
            insert_edge(
                &txn,
                RestCollectActive {
                    user_id: Set(user_id),
                    rest_id: Set(place_id.to_owned()),
                    ..Default::default()
                },
            )
            .await?;
            add_to_default_map(&txn, user_id, place_id).await?;
        }
        txn.commit().await?;

        Ok(MutationOutcome::ok(format!(
            "user {user_id} has collected restaurant {place_id}"
        )))
    }

    pub async fn uncollect(&self, viewer: Viewer, place_id: &str) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;

        let txn = self.db.begin().await?;
        RestCollect::delete_many()
            .filter(rest_collect::Column::UserId.eq(user_id))
            .filter(rest_collect::Column::RestId.eq(place_id))
            .exec(&txn)
            .await?;
        remove_from_default_map(&txn, user_id, place_id).await?;
        txn.commit().await?;

        Ok(MutationOutcome::ok(format!(
            "user {user_id} has uncollected restaurant {place_id}"
        )))
    }

    /// Like toggle; clears any dislike first so the combined machine never
    /// holds both edges
    pub async fn like(&self, viewer: Viewer, place_id: &str) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        ensure_restaurant(&*self.db, place_id).await?;

        let txn = self.db.begin().await?;
        RestDislike::delete_many()
            .filter(rest_dislike::Column::UserId.eq(user_id))
            .filter(rest_dislike::Column::RestId.eq(place_id))
            .exec(&txn)
            .await?;
        let already = RestLike::find()
            .filter(rest_like::Column::UserId.eq(user_id))
            .filter(rest_like::Column::RestId.eq(place_id))
            .one(&txn)
            .await?
            .is_some();
        if !already {
            insert_edge(
                &txn,
                RestLikeActive {
                    user_id: Set(user_id),
                    rest_id: Set(place_id.to_owned()),
                    ..Default::default()
                },
            )
            .await?;
        }
        txn.commit().await?;

        Ok(MutationOutcome::ok(format!(
            "user {user_id} has liked restaurant {place_id}"
        )))
    }

    pub async fn unlike(&self, viewer: Viewer, place_id: &str) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        RestLike::delete_many()
            .filter(rest_like::Column::UserId.eq(user_id))
            .filter(rest_like::Column::RestId.eq(place_id))
            .exec(&*self.db)
            .await?;
        Ok(MutationOutcome::ok(format!(
            "user {user_id} has unliked restaurant {place_id}"
        )))
    }

    /// Dislike toggle; clears any like first
    pub async fn dislike(&self, viewer: Viewer, place_id: &str) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        ensure_restaurant(&*self.db, place_id).await?;

        let txn = self.db.begin().await?;
        RestLike::delete_many()
            .filter(rest_like::Column::UserId.eq(user_id))
            .filter(rest_like::Column::RestId.eq(place_id))
            .exec(&txn)
            .await?;
        let already = RestDislike::find()
            .filter(rest_dislike::Column::UserId.eq(user_id))
            .filter(rest_dislike::Column::RestId.eq(place_id))
            .one(&txn)
            .await?
            .is_some();
        if !already {
            insert_edge(
                &txn,
                RestDislikeActive {
                    user_id: Set(user_id),
                    rest_id: Set(place_id.to_owned()),
                    ..Default::default()
                },
            )
            .await?;
        }
        txn.commit().await?;

        Ok(MutationOutcome::ok(format!(
            "user {user_id} has disliked restaurant {place_id}"
        )))
    }

    pub async fn undislike(&self, viewer: Viewer, place_id: &str) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        RestDislike::delete_many()
            .filter(rest_dislike::Column::UserId.eq(user_id))
            .filter(rest_dislike::Column::RestId.eq(place_id))
            .exec(&*self.db)
            .await?;
        Ok(MutationOutcome::ok(format!(
            "user {user_id} has undisliked restaurant {place_id}"
        )))
    }
}

pub(crate) async fn ensure_restaurant<C: ConnectionTrait>(conn: &C, place_id: &str) -> Result<()> {
    Restaurant::find_by_id(place_id)
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| CoreError::NotFound(format!("restaurant {place_id}")))
}

async fn add_to_default_map(
    txn: &DatabaseTransaction,
    user_id: i32,
    place_id: &str,
) -> Result<()> {
    let Some(user) = User::find_by_id(user_id).one(txn).await? else {
        return Ok(());
    };
    let Some(map_id) = user.map_id else {
        return Ok(());
    };
    let Some(map_row) = Map::find_by_id(map_id).one(txn).await? else {
        return Ok(());
    };

    let mut members = map_row.member_place_ids();
    if !members.iter().any(|member| member == place_id) {
        members.push(place_id.to_owned());
        let mut active: map::ActiveModel = map_row.into();
        active.rest_ids = Set(serde_json::to_value(&members)?);
        sea_orm::ActiveModelTrait::update(active, txn).await?;
    }
    Ok(())
}

async fn remove_from_default_map(
    txn: &DatabaseTransaction,
    user_id: i32,
    place_id: &str,
) -> Result<()> {
    let Some(user) = User::find_by_id(user_id).one(txn).await? else {
        return Ok(());
    };
    let Some(map_id) = user.map_id else {
        return Ok(());
    };
    let Some(map_row) = Map::find_by_id(map_id).one(txn).await? else {
        return Ok(());
    };

    let mut members = map_row.member_place_ids();
    let before = members.len();
    members.retain(|member| member != place_id);
    if members.len() != before {
        let mut active: map::ActiveModel = map_row.into();
        active.rest_ids = Set(serde_json::to_value(&members)?);
        sea_orm::ActiveModelTrait::update(active, txn).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::entities::{MapActive, UserActive};
    use crate::infrastructure::database::Database;
    use crate::infrastructure::places::GeoSearch;
    use async_trait::async_trait;
    use sea_orm::{ActiveModelTrait, PaginatorTrait};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;

    struct FakePlaces {
        detail_calls: AtomicUsize,
        details: Option<PlaceDetails>,
    }

    impl FakePlaces {
        fn empty() -> Self {
            Self {
                detail_calls: AtomicUsize::new(0),
                details: None,
            }
        }
    }

    #[async_trait]
    impl GeoSearch for FakePlaces {
        async fn nearby(
            &self,
            _keyword: &str,
            _lat: f64,
            _lng: f64,
            _radius_m: u32,
        ) -> Result<Vec<PlaceCandidate>> {
            Ok(Vec::new())
        }

        async fn details(&self, _place_id: &str) -> Result<Option<PlaceDetails>> {
            self.detail_calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.details.clone())
        }
    }

    async fn service_with(places: FakePlaces) -> (Arc<DatabaseConnection>, RestaurantService) {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let db = Arc::new(db.conn().clone());
        let places = Arc::new(PlacesService::new(
            Arc::new(places),
            Duration::from_secs(3600),
        ));
        let service = RestaurantService::new(db.clone(), places);
        (db, service)
    }

    async fn setup() -> (Arc<DatabaseConnection>, RestaurantService) {
        service_with(FakePlaces::empty()).await
    }

    async fn seed_user(db: &DatabaseConnection, name: &str) -> i32 {
        UserActive {
            name: Set(name.to_string()),
            email: Set(format!("{name}@example.com")),
            created: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    async fn seed_restaurant(db: &DatabaseConnection, place_id: &str, name: &str, lat: f64, lng: f64) {
        RestaurantActive {
            place_id: Set(place_id.to_string()),
            name: Set(name.to_string()),
            lat: Set(lat),
            lng: Set(lng),
            rating: Set(4.0),
            types: Set(serde_json::json!(["restaurant"])),
            created: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn collect_is_idempotent() {
        let (db, service) = setup().await;
        let user = seed_user(&db, "alice").await;
        seed_restaurant(&db, "p1", "JJ Poke", 25.0, 121.5).await;
        let viewer = Viewer::user(user);

        service.collect(viewer, "p1").await.unwrap();
        service.collect(viewer, "p1").await.unwrap();
        assert_eq!(RestCollect::find().count(&*db).await.unwrap(), 1);

        service.uncollect(viewer, "p1").await.unwrap();
        assert_eq!(RestCollect::find().count(&*db).await.unwrap(), 0);

        // deleting a never-created edge is a no-op, not an error
        service.uncollect(viewer, "p1").await.unwrap();
        assert_eq!(RestCollect::find().count(&*db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn anonymous_mutation_is_rejected() {
        let (db, service) = setup().await;
        seed_restaurant(&db, "p1", "JJ Poke", 25.0, 121.5).await;

        let err = service.collect(Viewer::ANONYMOUS, "p1").await.unwrap_err();
        assert!(matches!(err, CoreError::Unauthenticated));
        assert_eq!(RestCollect::find().count(&*db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn like_and_dislike_are_mutually_exclusive() {
        let (db, service) = setup().await;
        let user = seed_user(&db, "alice").await;
        seed_restaurant(&db, "p1", "JJ Poke", 25.0, 121.5).await;
        let viewer = Viewer::user(user);

        service.like(viewer, "p1").await.unwrap();
        service.dislike(viewer, "p1").await.unwrap();
        assert_eq!(RestLike::find().count(&*db).await.unwrap(), 0);
        assert_eq!(RestDislike::find().count(&*db).await.unwrap(), 1);

        service.like(viewer, "p1").await.unwrap();
        assert_eq!(RestLike::find().count(&*db).await.unwrap(), 1);
        assert_eq!(RestDislike::find().count(&*db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_edge_rows_do_not_inflate_counts() {
        let (db, service) = setup().await;
        let user = seed_user(&db, "alice").await;
        seed_restaurant(&db, "p1", "JJ Poke", 25.0, 121.5).await;

        // Simulate historic duplicates written around the idempotence check
        for _ in 0..3 {
            RestCollectActive {
                user_id: Set(user),
                rest_id: Set("p1".to_string()),
                ..Default::default()
            }
            .insert(&*db)
            .await
            .unwrap();
        }

        let page = service
            .list(Viewer::ANONYMOUS, &RestaurantQuery::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].collect_count, 1);
    }

    #[tokio::test]
    async fn viewer_flags_follow_the_viewer() {
        let (db, service) = setup().await;
        let alice = seed_user(&db, "alice").await;
        seed_restaurant(&db, "p1", "JJ Poke", 25.0, 121.5).await;
        service.collect(Viewer::user(alice), "p1").await.unwrap();

        let as_alice = service
            .list(Viewer::user(alice), &RestaurantQuery::default())
            .await
            .unwrap();
        assert!(as_alice.items[0].has_collected);
        assert_eq!(as_alice.items[0].collect_count, 1);

        let anonymous = service
            .list(Viewer::ANONYMOUS, &RestaurantQuery::default())
            .await
            .unwrap();
        assert!(!anonymous.items[0].has_collected);
        assert_eq!(anonymous.items[0].collect_count, 1);
    }

    #[tokio::test]
    async fn total_reflects_filters_not_the_page() {
        let (db, service) = setup().await;
        seed_restaurant(&db, "p1", "JJ Poke", 25.0, 121.5).await;
        seed_restaurant(&db, "p2", "Poke House", 25.0, 121.5).await;
        seed_restaurant(&db, "p3", "Ramen Bar", 25.0, 121.5).await;

        let query = RestaurantQuery {
            text: Some("poke".into()),
            page: PageRequest::new(0, 1),
            ..Default::default()
        };
        let page = service.list(Viewer::ANONYMOUS, &query).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn count_ordering_breaks_ties_by_id() {
        let (db, service) = setup().await;
        let alice = seed_user(&db, "alice").await;
        seed_restaurant(&db, "pb", "B Spot", 25.0, 121.5).await;
        seed_restaurant(&db, "pa", "A Spot", 25.0, 121.5).await;
        service.collect(Viewer::user(alice), "pa").await.unwrap();
        service.collect(Viewer::user(alice), "pb").await.unwrap();

        let first = service
            .list(Viewer::ANONYMOUS, &RestaurantQuery::default())
            .await
            .unwrap();
        let second = service
            .list(Viewer::ANONYMOUS, &RestaurantQuery::default())
            .await
            .unwrap();

        let order: Vec<&str> = first.items.iter().map(|r| r.place_id.as_str()).collect();
        assert_eq!(order, vec!["pa", "pb"]);
        let rerun: Vec<&str> = second.items.iter().map(|r| r.place_id.as_str()).collect();
        assert_eq!(order, rerun);
    }

    #[tokio::test]
    async fn bounding_box_filters_per_axis() {
        let (db, service) = setup().await;
        seed_restaurant(&db, "inside", "Inside", 25.05, 121.55).await;
        seed_restaurant(&db, "north_of", "North", 26.0, 121.55).await;
        seed_restaurant(&db, "east_of", "East", 25.05, 122.5).await;

        let query = RestaurantQuery {
            bounds: Some(BoundingBox::new(25.0, 121.5, 25.1, 121.6).unwrap()),
            ..Default::default()
        };
        let page = service.list(Viewer::ANONYMOUS, &query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].place_id, "inside");
    }

    #[tokio::test]
    async fn collected_scope_limits_to_the_collector() {
        let (db, service) = setup().await;
        let alice = seed_user(&db, "alice").await;
        seed_restaurant(&db, "p1", "JJ Poke", 25.0, 121.5).await;
        seed_restaurant(&db, "p2", "Ramen Bar", 25.0, 121.5).await;
        service.collect(Viewer::user(alice), "p1").await.unwrap();

        let query = RestaurantQuery {
            scope: Scope::CollectedBy(alice),
            ..Default::default()
        };
        let page = service.list(Viewer::user(alice), &query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].place_id, "p1");
        assert!(page.items[0].has_collected);
    }

    #[tokio::test]
    async fn collect_mirrors_into_the_default_map() {
        let (db, service) = setup().await;
        let alice = seed_user(&db, "alice").await;
        seed_restaurant(&db, "p1", "JJ Poke", 25.0, 121.5).await;

        let map_row = MapActive {
            name: Set("alice's map".into()),
            lat: Set(25.0),
            lng: Set(121.5),
            author: Set(alice),
            tags: Set(serde_json::json!([])),
            rest_ids: Set(serde_json::json!([])),
            created: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*db)
        .await
        .unwrap();
        let mut user_active: crate::infrastructure::database::entities::user::ActiveModel =
            User::find_by_id(alice).one(&*db).await.unwrap().unwrap().into();
        user_active.map_id = Set(Some(map_row.id));
        user_active.update(&*db).await.unwrap();

        service.collect(Viewer::user(alice), "p1").await.unwrap();
        let members = Map::find_by_id(map_row.id)
            .one(&*db)
            .await
            .unwrap()
            .unwrap()
            .member_place_ids();
        assert_eq!(members, vec!["p1".to_string()]);

        service.uncollect(Viewer::user(alice), "p1").await.unwrap();
        let members = Map::find_by_id(map_row.id)
            .one(&*db)
            .await
            .unwrap()
            .unwrap()
            .member_place_ids();
        assert!(members.is_empty());
    }

    #[tokio::test]
    async fn cold_get_warms_from_the_places_provider() {
        let places = FakePlaces {
            detail_calls: AtomicUsize::new(0),
            details: Some(PlaceDetails {
                place_id: "p9".into(),
                name: "Boba Guys".into(),
                address: Some("somewhere".into()),
                telephone: None,
                rating: 4.6,
                lat: 25.0,
                lng: 121.5,
                photo_url: None,
            }),
        };
        let (db, service) = service_with(places).await;

        let got = service.get(Viewer::ANONYMOUS, "p9").await.unwrap();
        assert_eq!(got.name, "Boba Guys");
        assert_eq!(got.collect_count, 0);
        assert!(!got.has_collected);

        // Second read is a store hit
        let again = service.get(Viewer::ANONYMOUS, "p9").await.unwrap();
        assert_eq!(again.place_id, "p9");
        assert_eq!(
            Restaurant::find().count(&*db).await.unwrap(),
            1,
            "warm path must not duplicate the row"
        );
    }

    #[tokio::test]
    async fn unknown_restaurant_without_details_is_not_found() {
        let (_db, service) = setup().await;
        let err = service.get(Viewer::ANONYMOUS, "nope").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn bulk_upsert_updates_existing_rows() {
        let (db, service) = setup().await;
        seed_restaurant(&db, "p1", "Old Name", 25.0, 121.5).await;

        let candidates = vec![
            PlaceCandidate {
                place_id: "p1".into(),
                name: "New Name".into(),
                rating: 4.8,
                user_ratings_total: Some(55),
                types: vec!["restaurant".into(), "food".into()],
                price_level: Some(2),
                lat: 25.0,
                lng: 121.5,
                photo_url: None,
            },
            PlaceCandidate {
                place_id: "p2".into(),
                name: "Brand New".into(),
                rating: 4.1,
                user_ratings_total: None,
                types: vec!["restaurant".into()],
                price_level: None,
                lat: 25.1,
                lng: 121.6,
                photo_url: None,
            },
        ];
        service.upsert_candidates(&candidates).await.unwrap();

        assert_eq!(Restaurant::find().count(&*db).await.unwrap(), 2);
        let updated = Restaurant::find_by_id("p1").one(&*db).await.unwrap().unwrap();
        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.rating, 4.8);
    }
}
