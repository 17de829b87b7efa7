//! Diary operations
//!
//! Diaries are dining posts tied to a restaurant. They carry two independent
//! edge kinds, favorite and collect, each with its own count and viewer flag.
//! The feed scope joins the follow table so a user sees posts from the people
//! they follow.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Alias, Condition, Expr, Func, JoinType, Order, Query, SelectStatement};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::infrastructure::database::entities::{
    diary, diary_collect, diary_fav, follow, reply, restaurant, user, Diary, DiaryActive,
    DiaryCollect, DiaryCollectActive, DiaryFav, DiaryFavActive, Reply, ReplyActive,
};
use crate::operations::edges::insert_edge;
use crate::operations::query::{
    direction, EngagementOrder, Page, PageRequest, Scope, TotalRow,
};
use crate::shared::{CoreError, MutationOutcome, Result, Viewer};

/// Diary card for feeds and profile grids
#[derive(Clone, Debug, Serialize)]
pub struct SimplifiedDiary {
    pub id: i32,
    pub author: i32,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub place_id: String,
    pub restaurant_name: String,
    pub cover_photo: Option<String>,
    pub favorite_count: u64,
    pub collect_count: u64,
    pub has_favorited: bool,
    pub has_collected: bool,
}

/// Full diary view with body, photos and replies
#[derive(Clone, Debug, Serialize)]
pub struct CompleteDiary {
    pub id: i32,
    pub author: i32,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub place_id: String,
    pub restaurant_name: String,
    pub content: String,
    pub items: Vec<String>,
    pub photos: Vec<String>,
    pub favorite_count: u64,
    pub collect_count: u64,
    pub has_favorited: bool,
    pub has_collected: bool,
    pub replies: Vec<DiaryReply>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DiaryReply {
    pub id: i32,
    pub author: i32,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub content: String,
}

/// Parameters for a diary listing
#[derive(Clone, Debug)]
pub struct DiaryQuery {
    /// Matches the restaurant name, not the diary body
    pub text: Option<String>,
    pub order: EngagementOrder,
    pub reverse: bool,
    pub page: PageRequest,
    pub scope: Scope,
}

impl Default for DiaryQuery {
    fn default() -> Self {
        Self {
            text: None,
            order: EngagementOrder::CreateTime,
            reverse: false,
            page: PageRequest::default(),
            scope: Scope::All,
        }
    }
}

/// Fields for a new diary
#[derive(Clone, Debug, Deserialize)]
pub struct NewDiary {
    pub place_id: String,
    pub content: String,
    pub items: Vec<String>,
    pub photos: Vec<String>,
}

/// Partial update; unknown fields are rejected at deserialization
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiaryPatch {
    pub content: Option<String>,
    pub items: Option<Vec<String>>,
    pub photos: Option<Vec<String>>,
}

impl DiaryPatch {
    fn is_empty(&self) -> bool {
        self.content.is_none() && self.items.is_none() && self.photos.is_none()
    }
}

#[derive(Debug, FromQueryResult)]
struct DiaryRow {
    id: i32,
    user_id: i32,
    author_name: String,
    author_avatar: Option<String>,
    rest_id: String,
    restaurant_name: String,
    content: String,
    items: serde_json::Value,
    photos: serde_json::Value,
    favorite_count: i64,
    collect_count: i64,
    has_favorited: bool,
    has_collected: bool,
}

impl DiaryRow {
    fn cover_photo(&self) -> Option<String> {
        self.photos
            .as_array()
            .and_then(|photos| photos.first())
            .and_then(|photo| photo.as_str())
            .map(str::to_owned)
    }

    fn into_simplified(self) -> SimplifiedDiary {
        let cover_photo = self.cover_photo();
        SimplifiedDiary {
            id: self.id,
            author: self.user_id,
            author_name: self.author_name,
            author_avatar: self.author_avatar,
            place_id: self.rest_id,
            restaurant_name: self.restaurant_name,
            cover_photo,
            favorite_count: self.favorite_count.max(0) as u64,
            collect_count: self.collect_count.max(0) as u64,
            has_favorited: self.has_favorited,
            has_collected: self.has_collected,
        }
    }
}

fn display_select(viewer: Viewer) -> SelectStatement {
    let favs = Alias::new("edge_favs");
    let collects = Alias::new("edge_collects");

    let mut stmt = Query::select();
    stmt.columns([
        (diary::Entity, diary::Column::Id),
        (diary::Entity, diary::Column::UserId),
        (diary::Entity, diary::Column::RestId),
        (diary::Entity, diary::Column::Content),
        (diary::Entity, diary::Column::Items),
        (diary::Entity, diary::Column::Photos),
    ])
    .expr_as(
        Expr::col((user::Entity, user::Column::Name)),
        Alias::new("author_name"),
    )
    .expr_as(
        Expr::col((user::Entity, user::Column::AvatarUrl)),
        Alias::new("author_avatar"),
    )
    .expr_as(
        Expr::col((restaurant::Entity, restaurant::Column::Name)),
        Alias::new("restaurant_name"),
    )
    .expr_as(
        Func::count_distinct(Expr::col((favs.clone(), diary_fav::Column::UserId))),
        Alias::new("favorite_count"),
    )
    .expr_as(
        Func::count_distinct(Expr::col((collects.clone(), diary_collect::Column::UserId))),
        Alias::new("collect_count"),
    )
    .expr_as(
        Expr::exists(
            Query::select()
                .expr(Expr::val(1))
                .from(diary_fav::Entity)
                .and_where(
                    Expr::col((diary_fav::Entity, diary_fav::Column::UserId)).eq(viewer.id()),
                )
                .and_where(
                    Expr::col((diary_fav::Entity, diary_fav::Column::DiaryId))
                        .equals((diary::Entity, diary::Column::Id)),
                )
                .take(),
        ),
        Alias::new("has_favorited"),
    )
    .expr_as(
        Expr::exists(
            Query::select()
                .expr(Expr::val(1))
                .from(diary_collect::Entity)
                .and_where(
                    Expr::col((diary_collect::Entity, diary_collect::Column::UserId))
                        .eq(viewer.id()),
                )
                .and_where(
                    Expr::col((diary_collect::Entity, diary_collect::Column::DiaryId))
                        .equals((diary::Entity, diary::Column::Id)),
                )
                .take(),
        ),
        Alias::new("has_collected"),
    )
    .from(diary::Entity)
    .join(
        JoinType::InnerJoin,
        user::Entity,
        Expr::col((diary::Entity, diary::Column::UserId)).equals((user::Entity, user::Column::Id)),
    )
    .join(
        JoinType::InnerJoin,
        restaurant::Entity,
        Expr::col((diary::Entity, diary::Column::RestId))
            .equals((restaurant::Entity, restaurant::Column::PlaceId)),
    )
    .join_as(
        JoinType::LeftJoin,
        diary_fav::Entity,
        favs.clone(),
        Expr::col((favs, diary_fav::Column::DiaryId)).equals((diary::Entity, diary::Column::Id)),
    )
    .join_as(
        JoinType::LeftJoin,
        diary_collect::Entity,
        collects.clone(),
        Expr::col((collects, diary_collect::Column::DiaryId))
            .equals((diary::Entity, diary::Column::Id)),
    )
    .group_by_col((diary::Entity, diary::Column::Id));

    stmt
}

fn apply_filters(stmt: &mut SelectStatement, text: Option<&str>, scope: &Scope) -> Result<()> {
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        stmt.and_where(
            Expr::expr(Func::lower(Expr::col((
                restaurant::Entity,
                restaurant::Column::Name,
            ))))
            .like(format!("%{}%", text.to_lowercase())),
        );
    }

    match scope {
        Scope::All => {}
        Scope::AuthoredBy(user_id) => {
            stmt.and_where(Expr::col((diary::Entity, diary::Column::UserId)).eq(*user_id));
        }
        Scope::Followees(user_id) => {
            // Feed: posts whose author the given user follows
            let followed = Alias::new("followed_authors");
            stmt.join_as(
                JoinType::InnerJoin,
                follow::Entity,
                followed.clone(),
                Condition::all()
                    .add(
                        Expr::col((followed.clone(), follow::Column::Followee))
                            .equals((diary::Entity, diary::Column::UserId)),
                    )
                    .add(Expr::col((followed, follow::Column::Follower)).eq(*user_id)),
            );
        }
        Scope::CollectedBy(user_id) => {
            let scoped = Alias::new("scoped_collects");
            stmt.join_as(
                JoinType::InnerJoin,
                diary_collect::Entity,
                scoped.clone(),
                Condition::all()
                    .add(
                        Expr::col((scoped.clone(), diary_collect::Column::DiaryId))
                            .equals((diary::Entity, diary::Column::Id)),
                    )
                    .add(Expr::col((scoped, diary_collect::Column::UserId)).eq(*user_id)),
            );
        }
    }

    Ok(())
}

/// Count select sharing the listing's join prerequisites. The restaurant
/// join is always present because the text filter targets it.
fn count_select() -> SelectStatement {
    let mut stmt = Query::select();
    stmt.expr_as(
        Func::count_distinct(Expr::col((diary::Entity, diary::Column::Id))),
        Alias::new("total"),
    )
    .from(diary::Entity)
    .join(
        JoinType::InnerJoin,
        restaurant::Entity,
        Expr::col((diary::Entity, diary::Column::RestId))
            .equals((restaurant::Entity, restaurant::Column::PlaceId)),
    );
    stmt
}

pub struct DiaryService {
    db: Arc<DatabaseConnection>,
}

impl DiaryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Aggregated diary listing
    pub async fn list(&self, viewer: Viewer, query: &DiaryQuery) -> Result<Page<SimplifiedDiary>> {
        let (offset, limit) = query.page.clamped();

        let mut count_stmt = count_select();
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
                stmt.order_by(
                    (diary::Entity, diary::Column::Created),
                    direction(query.reverse),
                );
            }
        }
        stmt.order_by((diary::Entity, diary::Column::Id), Order::Asc)
            .limit(limit)
            .offset(offset);

        let backend = self.db.get_database_backend();
        let (total_row, rows) = futures::try_join!(
            TotalRow::find_by_statement(backend.build(&count_stmt)).one(&*self.db),
            DiaryRow::find_by_statement(backend.build(&stmt)).all(&*self.db),
        )?;

        Ok(Page {
            total: total_row.map(|row| row.total.max(0) as u64).unwrap_or(0),
            items: rows.into_iter().map(DiaryRow::into_simplified).collect(),
        })
    }

    /// Complete diary view with replies
    pub async fn get(&self, viewer: Viewer, diary_id: i32) -> Result<CompleteDiary> {
        let mut stmt = display_select(viewer);
        stmt.and_where(Expr::col((diary::Entity, diary::Column::Id)).eq(diary_id));

        let backend = self.db.get_database_backend();
        let row = DiaryRow::find_by_statement(backend.build(&stmt))
            .one(&*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("diary {diary_id}")))?;

        let replies = self.replies_of(diary_id).await?;
        let items = serde_json::from_value(row.items.clone()).unwrap_or_default();
        let photos = serde_json::from_value(row.photos.clone()).unwrap_or_default();

        Ok(CompleteDiary {
            id: row.id,
            author: row.user_id,
            author_name: row.author_name,
            author_avatar: row.author_avatar,
            place_id: row.rest_id,
            restaurant_name: row.restaurant_name,
            content: row.content,
            items,
            photos,
            favorite_count: row.favorite_count.max(0) as u64,
            collect_count: row.collect_count.max(0) as u64,
            has_favorited: row.has_favorited,
            has_collected: row.has_collected,
            replies,
        })
    }

    async fn replies_of(&self, diary_id: i32) -> Result<Vec<DiaryReply>> {
        let rows = Reply::find()
            .filter(reply::Column::DiaryId.eq(diary_id))
            .find_also_related(user::Entity)
            .order_by_asc(reply::Column::Id)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(reply_row, author)| DiaryReply {
                id: reply_row.id,
                author: reply_row.author,
                author_name: author.as_ref().map(|a| a.name.clone()).unwrap_or_default(),
                author_avatar: author.and_then(|a| a.avatar_url),
                content: reply_row.content,
            })
            .collect())
    }

    pub async fn create(&self, viewer: Viewer, new_diary: NewDiary) -> Result<i32> {
        let user_id = viewer.require()?;
        if new_diary.photos.is_empty() {
            return Err(CoreError::InvalidArgument(
                "a diary needs at least one photo".into(),
            ));
        }
        crate::operations::restaurants::ensure_restaurant(&*self.db, &new_diary.place_id).await?;

        let created = DiaryActive {
            user_id: Set(user_id),
            rest_id: Set(new_diary.place_id),
            content: Set(new_diary.content),
            items: Set(serde_json::to_value(&new_diary.items)?),
            photos: Set(serde_json::to_value(&new_diary.photos)?),
            created: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(diary_id = created.id, author = user_id, "created diary");
        Ok(created.id)
    }

    /// Apply a partial update. Only the author may modify a diary, and the
    /// photo set can never be emptied.
    pub async fn update(
        &self,
        viewer: Viewer,
        diary_id: i32,
        patch: DiaryPatch,
    ) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        if patch.is_empty() {
            return Err(CoreError::InvalidArgument("empty patch".into()));
        }
        if let Some(photos) = &patch.photos {
            if photos.is_empty() {
                return Err(CoreError::InvalidArgument(
                    "a diary needs at least one photo".into(),
                ));
            }
        }

        let existing = Diary::find_by_id(diary_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("diary {diary_id}")))?;
        if existing.user_id != user_id {
            return Err(CoreError::Forbidden(format!(
                "user {user_id} does not own diary {diary_id}"
            )));
        }

        let mut active: diary::ActiveModel = existing.into();
        if let Some(content) = patch.content {
            active.content = Set(content);
        }
        if let Some(items) = patch.items {
            active.items = Set(serde_json::to_value(&items)?);
        }
        if let Some(photos) = patch.photos {
            active.photos = Set(serde_json::to_value(&photos)?);
        }
        active.update(&*self.db).await?;

        Ok(MutationOutcome::ok(format!("diary {diary_id} updated")))
    }

    /// Delete a diary with its replies and edges. Only the author may delete.
    pub async fn delete(&self, viewer: Viewer, diary_id: i32) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;

        let existing = Diary::find_by_id(diary_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("diary {diary_id}")))?;
        if existing.user_id != user_id {
            return Err(CoreError::Forbidden(format!(
                "user {user_id} does not own diary {diary_id}"
            )));
        }

        let txn = self.db.begin().await?;
        Reply::delete_many()
            .filter(reply::Column::DiaryId.eq(diary_id))
            .exec(&txn)
            .await?;
        DiaryFav::delete_many()
            .filter(diary_fav::Column::DiaryId.eq(diary_id))
            .exec(&txn)
            .await?;
        DiaryCollect::delete_many()
            .filter(diary_collect::Column::DiaryId.eq(diary_id))
            .exec(&txn)
            .await?;
        Diary::delete_by_id(diary_id).exec(&txn).await?;
        txn.commit().await?;

        info!(diary_id, "deleted diary");
        Ok(MutationOutcome::ok(format!("diary {diary_id} deleted")))
    }

    pub async fn collect(&self, viewer: Viewer, diary_id: i32) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        self.ensure_diary(diary_id).await?;

        let already = DiaryCollect::find()
            .filter(diary_collect::Column::UserId.eq(user_id))
            .filter(diary_collect::Column::DiaryId.eq(diary_id))
            .one(&*self.db)
            .await?
            .is_some();
        if !already {
            insert_edge(
                &*self.db,
                DiaryCollectActive {
                    user_id: Set(user_id),
                    diary_id: Set(diary_id),
                    ..Default::default()
                },
            )
            .await?;
        }

        Ok(MutationOutcome::ok(format!(
            "user {user_id} has collected diary {diary_id}"
        )))
    }

    pub async fn uncollect(&self, viewer: Viewer, diary_id: i32) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        DiaryCollect::delete_many()
            .filter(diary_collect::Column::UserId.eq(user_id))
            .filter(diary_collect::Column::DiaryId.eq(diary_id))
            .exec(&*self.db)
            .await?;
        Ok(MutationOutcome::ok(format!(
            "user {user_id} has uncollected diary {diary_id}"
        )))
    }

    pub async fn favorite(&self, viewer: Viewer, diary_id: i32) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        self.ensure_diary(diary_id).await?;

        let already = DiaryFav::find()
            .filter(diary_fav::Column::UserId.eq(user_id))
            .filter(diary_fav::Column::DiaryId.eq(diary_id))
            .one(&*self.db)
            .await?
            .is_some();
        if !already {
            insert_edge(
                &*self.db,
                DiaryFavActive {
                    user_id: Set(user_id),
                    diary_id: Set(diary_id),
                    ..Default::default()
                },
            )
            .await?;
        }

        Ok(MutationOutcome::ok(format!(
            "user {user_id} has favorited diary {diary_id}"
        )))
    }

    pub async fn unfavorite(&self, viewer: Viewer, diary_id: i32) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        DiaryFav::delete_many()
            .filter(diary_fav::Column::UserId.eq(user_id))
            .filter(diary_fav::Column::DiaryId.eq(diary_id))
            .exec(&*self.db)
            .await?;
        Ok(MutationOutcome::ok(format!(
            "user {user_id} has unfavorited diary {diary_id}"
        )))
    }

    pub async fn add_reply(
        &self,
        viewer: Viewer,
        diary_id: i32,
        content: String,
    ) -> Result<i32> {
        let user_id = viewer.require()?;
        if content.trim().is_empty() {
            return Err(CoreError::InvalidArgument(
                "reply content must not be empty".into(),
            ));
        }
        self.ensure_diary(diary_id).await?;

        let created = ReplyActive {
            diary_id: Set(diary_id),
            author: Set(user_id),
            content: Set(content),
            created: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        Ok(created.id)
    }

    async fn ensure_diary(&self, diary_id: i32) -> Result<()> {
        Diary::find_by_id(diary_id)
            .one(&*self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("diary {diary_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::entities::{FollowActive, RestaurantActive, UserActive};
    use crate::infrastructure::database::Database;
    use sea_orm::PaginatorTrait;

    async fn setup() -> (Arc<DatabaseConnection>, DiaryService) {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let db = Arc::new(db.conn().clone());
        let service = DiaryService::new(db.clone());
        (db, service)
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

    async fn seed_restaurant(db: &DatabaseConnection, place_id: &str, name: &str) {
        RestaurantActive {
            place_id: Set(place_id.to_string()),
            name: Set(name.to_string()),
            lat: Set(25.0),
            lng: Set(121.5),
            rating: Set(4.0),
            types: Set(serde_json::json!(["restaurant"])),
            created: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
    }

    fn new_diary(place_id: &str) -> NewDiary {
        NewDiary {
            place_id: place_id.to_string(),
            content: "great bowl".into(),
            items: vec!["salmon poke".into()],
            photos: vec!["https://img.example/1.jpg".into()],
        }
    }

    #[tokio::test]
    async fn create_requires_a_photo() {
        let (db, service) = setup().await;
        let alice = seed_user(&db, "alice").await;
        seed_restaurant(&db, "p1", "JJ Poke").await;

        let mut diary = new_diary("p1");
        diary.photos.clear();
        let err = service.create(Viewer::user(alice), diary).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));

        let id = service
            .create(Viewer::user(alice), new_diary("p1"))
            .await
            .unwrap();
        assert!(id > 0);
    }

    #[tokio::test]
    async fn complete_view_carries_replies_and_counts() {
        let (db, service) = setup().await;
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;
        seed_restaurant(&db, "p1", "JJ Poke").await;

        let diary_id = service
            .create(Viewer::user(alice), new_diary("p1"))
            .await
            .unwrap();
        service.favorite(Viewer::user(bob), diary_id).await.unwrap();
        service
            .add_reply(Viewer::user(bob), diary_id, "looks delicious".into())
            .await
            .unwrap();

        let complete = service.get(Viewer::user(bob), diary_id).await.unwrap();
        assert_eq!(complete.author_name, "alice");
        assert_eq!(complete.restaurant_name, "JJ Poke");
        assert_eq!(complete.favorite_count, 1);
        assert!(complete.has_favorited);
        assert!(!complete.has_collected);
        assert_eq!(complete.replies.len(), 1);
        assert_eq!(complete.replies[0].author_name, "bob");
        assert_eq!(complete.replies[0].content, "looks delicious");
    }

    #[tokio::test]
    async fn followee_scope_builds_the_feed() {
        let (db, service) = setup().await;
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;
        let carol = seed_user(&db, "carol").await;
        seed_restaurant(&db, "p1", "JJ Poke").await;

        service
            .create(Viewer::user(bob), new_diary("p1"))
            .await
            .unwrap();
        service
            .create(Viewer::user(carol), new_diary("p1"))
            .await
            .unwrap();

        FollowActive {
            follower: Set(alice),
            followee: Set(bob),
            ..Default::default()
        }
        .insert(&*db)
        .await
        .unwrap();

        let query = DiaryQuery {
            scope: Scope::Followees(alice),
            ..Default::default()
        };
        let page = service.list(Viewer::user(alice), &query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].author_name, "bob");
    }

    #[tokio::test]
    async fn text_filter_targets_the_restaurant_name() {
        let (db, service) = setup().await;
        let alice = seed_user(&db, "alice").await;
        seed_restaurant(&db, "p1", "JJ Poke").await;
        seed_restaurant(&db, "p2", "Ramen Bar").await;

        service
            .create(Viewer::user(alice), new_diary("p1"))
            .await
            .unwrap();
        service
            .create(Viewer::user(alice), new_diary("p2"))
            .await
            .unwrap();

        let query = DiaryQuery {
            text: Some("poke".into()),
            ..Default::default()
        };
        let page = service.list(Viewer::ANONYMOUS, &query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].restaurant_name, "JJ Poke");
    }

    #[tokio::test]
    async fn favorite_and_collect_are_independent_toggles() {
        let (db, service) = setup().await;
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;
        seed_restaurant(&db, "p1", "JJ Poke").await;
        let diary_id = service
            .create(Viewer::user(alice), new_diary("p1"))
            .await
            .unwrap();

        service.favorite(Viewer::user(bob), diary_id).await.unwrap();
        service.favorite(Viewer::user(bob), diary_id).await.unwrap();
        service.collect(Viewer::user(bob), diary_id).await.unwrap();
        assert_eq!(DiaryFav::find().count(&*db).await.unwrap(), 1);
        assert_eq!(DiaryCollect::find().count(&*db).await.unwrap(), 1);

        service.unfavorite(Viewer::user(bob), diary_id).await.unwrap();
        assert_eq!(DiaryFav::find().count(&*db).await.unwrap(), 0);
        assert_eq!(DiaryCollect::find().count(&*db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_removes_replies_and_edges() {
        let (db, service) = setup().await;
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;
        seed_restaurant(&db, "p1", "JJ Poke").await;
        let diary_id = service
            .create(Viewer::user(alice), new_diary("p1"))
            .await
            .unwrap();
        service
            .add_reply(Viewer::user(bob), diary_id, "nice".into())
            .await
            .unwrap();
        service.favorite(Viewer::user(bob), diary_id).await.unwrap();

        let err = service
            .delete(Viewer::user(bob), diary_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        service.delete(Viewer::user(alice), diary_id).await.unwrap();
        assert_eq!(Diary::find().count(&*db).await.unwrap(), 0);
        assert_eq!(Reply::find().count(&*db).await.unwrap(), 0);
        assert_eq!(DiaryFav::find().count(&*db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn patch_cannot_empty_the_photo_set() {
        let (db, service) = setup().await;
        let alice = seed_user(&db, "alice").await;
        seed_restaurant(&db, "p1", "JJ Poke").await;
        let diary_id = service
            .create(Viewer::user(alice), new_diary("p1"))
            .await
            .unwrap();

        let patch = DiaryPatch {
            photos: Some(vec![]),
            ..Default::default()
        };
        let err = service
            .update(Viewer::user(alice), diary_id, patch)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));

        let patch = DiaryPatch {
            content: Some("even better on the second visit".into()),
            ..Default::default()
        };
        service
            .update(Viewer::user(alice), diary_id, patch)
            .await
            .unwrap();
        let updated = service.get(Viewer::ANONYMOUS, diary_id).await.unwrap();
        assert_eq!(updated.content, "even better on the second visit");
    }
}
