//! User operations
//!
//! Profile views aggregate three numbers per user: how many people they
//! follow, how many follow them, and how many diaries they have posted.
//! Each comes from its own aliased left join with COUNT(DISTINCT) so the
//! joins cannot multiply each other. Follow is the only user-to-user edge
//! and a user can never follow themselves.

use std::sync::Arc;

use sea_orm::sea_query::{Alias, Expr, Func, JoinType, Order, Query, SelectStatement};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::infrastructure::database::entities::{
    diary, follow, user, Follow, FollowActive, User,
};
use crate::infrastructure::storage::BlobStore;
use crate::operations::edges::insert_edge;
use crate::operations::query::{direction, Page, PageRequest, TotalRow, UserOrder};
use crate::shared::{CoreError, MutationOutcome, Result, Viewer};

/// Profile view with social aggregates
#[derive(Clone, Debug, Serialize)]
pub struct UserProfile {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub map_id: Option<i32>,
    pub following_count: u64,
    pub follower_count: u64,
    pub diary_count: u64,
    pub is_following: bool,
}

/// Parameters for a user listing
#[derive(Clone, Debug)]
pub struct UserQuery {
    pub text: Option<String>,
    pub order: UserOrder,
    pub reverse: bool,
    pub page: PageRequest,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            text: None,
            order: UserOrder::Following,
            reverse: false,
            page: PageRequest::default(),
        }
    }
}

/// Partial profile update; unknown fields are rejected at deserialization
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserPatch {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserPatch {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.avatar_url.is_none()
    }
}

#[derive(Debug, FromQueryResult)]
struct UserRow {
    id: i32,
    name: String,
    email: String,
    avatar_url: Option<String>,
    map_id: Option<i32>,
    following_count: i64,
    follower_count: i64,
    diary_count: i64,
    is_following: bool,
}

impl UserRow {
    fn into_profile(self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name,
            email: self.email,
            avatar_url: self.avatar_url,
            map_id: self.map_id,
            following_count: self.following_count.max(0) as u64,
            follower_count: self.follower_count.max(0) as u64,
            diary_count: self.diary_count.max(0) as u64,
            is_following: self.is_following,
        }
    }
}

fn display_select(viewer: Viewer) -> SelectStatement {
    let followings = Alias::new("edge_followings");
    let followers = Alias::new("edge_followers");
    let diaries = Alias::new("authored_diaries");

    let mut stmt = Query::select();
    stmt.columns([
        (user::Entity, user::Column::Id),
        (user::Entity, user::Column::Name),
        (user::Entity, user::Column::Email),
        (user::Entity, user::Column::AvatarUrl),
        (user::Entity, user::Column::MapId),
    ])
    .expr_as(
        Func::count_distinct(Expr::col((followings.clone(), follow::Column::Followee))),
        Alias::new("following_count"),
    )
    .expr_as(
        Func::count_distinct(Expr::col((followers.clone(), follow::Column::Follower))),
        Alias::new("follower_count"),
    )
    .expr_as(
        Func::count_distinct(Expr::col((diaries.clone(), diary::Column::Id))),
        Alias::new("diary_count"),
    )
    .expr_as(
        Expr::exists(
            Query::select()
                .expr(Expr::val(1))
                .from(follow::Entity)
                .and_where(
                    Expr::col((follow::Entity, follow::Column::Follower)).eq(viewer.id()),
                )
                .and_where(
                    Expr::col((follow::Entity, follow::Column::Followee))
                        .equals((user::Entity, user::Column::Id)),
                )
                .take(),
        ),
        Alias::new("is_following"),
    )
    .from(user::Entity)
    .join_as(
        JoinType::LeftJoin,
        follow::Entity,
        followings.clone(),
        Expr::col((followings, follow::Column::Follower)).equals((user::Entity, user::Column::Id)),
    )
    .join_as(
        JoinType::LeftJoin,
        follow::Entity,
        followers.clone(),
        Expr::col((followers, follow::Column::Followee)).equals((user::Entity, user::Column::Id)),
    )
    .join_as(
        JoinType::LeftJoin,
        diary::Entity,
        diaries.clone(),
        Expr::col((diaries, diary::Column::UserId)).equals((user::Entity, user::Column::Id)),
    )
    .group_by_col((user::Entity, user::Column::Id));

    stmt
}

fn apply_text_filter(stmt: &mut SelectStatement, text: Option<&str>) {
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        stmt.and_where(
            Expr::expr(Func::lower(Expr::col((user::Entity, user::Column::Name))))
                .like(format!("%{}%", text.to_lowercase())),
        );
    }
}

pub struct UserService {
    db: Arc<DatabaseConnection>,
    blobs: Arc<dyn BlobStore>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    /// Profile view for one user
    pub async fn get(&self, viewer: Viewer, user_id: i32) -> Result<UserProfile> {
        let mut stmt = display_select(viewer);
        stmt.and_where(Expr::col((user::Entity, user::Column::Id)).eq(user_id));

        let backend = self.db.get_database_backend();
        let row = UserRow::find_by_statement(backend.build(&stmt))
            .one(&*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {user_id}")))?;
        Ok(row.into_profile())
    }

    /// Aggregated user listing
    pub async fn list(&self, viewer: Viewer, query: &UserQuery) -> Result<Page<UserProfile>> {
        let (offset, limit) = query.page.clamped();

        let mut count_stmt = Query::select();
        count_stmt
            .expr_as(
                Func::count_distinct(Expr::col((user::Entity, user::Column::Id))),
                Alias::new("total"),
            )
            .from(user::Entity);
        apply_text_filter(&mut count_stmt, query.text.as_deref());

        let mut stmt = display_select(viewer);
        apply_text_filter(&mut stmt, query.text.as_deref());
        match query.order {
            UserOrder::Following => {
                // "following" orders by audience size
                stmt.order_by_expr(
                    Expr::col(Alias::new("follower_count")).into(),
                    direction(query.reverse),
                );
            }
            UserOrder::CreateTime => {
                stmt.order_by(
                    (user::Entity, user::Column::Created),
                    direction(query.reverse),
                );
            }
        }
        stmt.order_by((user::Entity, user::Column::Id), Order::Asc)
            .limit(limit)
            .offset(offset);

        let backend = self.db.get_database_backend();
        let (total_row, rows) = futures::try_join!(
            TotalRow::find_by_statement(backend.build(&count_stmt)).one(&*self.db),
            UserRow::find_by_statement(backend.build(&stmt)).all(&*self.db),
        )?;

        Ok(Page {
            total: total_row.map(|row| row.total.max(0) as u64).unwrap_or(0),
            items: rows.into_iter().map(UserRow::into_profile).collect(),
        })
    }

    /// Apply a partial update to the viewer's own profile
    pub async fn update(&self, viewer: Viewer, patch: UserPatch) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        if patch.is_empty() {
            return Err(CoreError::InvalidArgument("empty patch".into()));
        }

        let existing = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {user_id}")))?;

        let mut active: user::ActiveModel = existing.into();
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(CoreError::InvalidArgument(
                    "user name must not be empty".into(),
                ));
            }
            active.name = Set(name);
        }
        if let Some(avatar_url) = patch.avatar_url {
            active.avatar_url = Set(Some(avatar_url));
        }
        active.update(&*self.db).await?;

        Ok(MutationOutcome::ok(format!("user {user_id} updated")))
    }

    /// Store an avatar image and point the profile at it
    pub async fn upload_avatar(
        &self,
        viewer: Viewer,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let user_id = viewer.require()?;
        if bytes.is_empty() {
            return Err(CoreError::InvalidArgument("empty avatar upload".into()));
        }

        let url = self.blobs.store(filename, bytes).await?;

        let existing = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {user_id}")))?;
        let mut active: user::ActiveModel = existing.into();
        active.avatar_url = Set(Some(url.clone()));
        active.update(&*self.db).await?;

        info!(user_id, "updated avatar");
        Ok(url)
    }

    pub async fn follow(&self, viewer: Viewer, target_id: i32) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        if user_id == target_id {
            return Err(CoreError::Forbidden(
                "a user cannot follow themselves".into(),
            ));
        }
        User::find_by_id(target_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {target_id}")))?;

        let already = Follow::find()
            .filter(follow::Column::Follower.eq(user_id))
            .filter(follow::Column::Followee.eq(target_id))
            .one(&*self.db)
            .await?
            .is_some();
        if !already {
            insert_edge(
                &*self.db,
                FollowActive {
                    follower: Set(user_id),
                    followee: Set(target_id),
                    ..Default::default()
                },
            )
            .await?;
        }

        Ok(MutationOutcome::ok(format!(
            "user {user_id} is following user {target_id}"
        )))
    }

    pub async fn unfollow(&self, viewer: Viewer, target_id: i32) -> Result<MutationOutcome> {
        let user_id = viewer.require()?;
        Follow::delete_many()
            .filter(follow::Column::Follower.eq(user_id))
            .filter(follow::Column::Followee.eq(target_id))
            .exec(&*self.db)
            .await?;
        Ok(MutationOutcome::ok(format!(
            "user {user_id} has unfollowed user {target_id}"
        )))
    }
}
