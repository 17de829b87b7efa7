//! Sea-ORM entity definitions
//!
//! These map the domain models to database tables. Edge tables carry an
//! autoincrement surrogate key and no unique (user, target) constraint;
//! edge existence is a set-membership fact, so services enforce idempotence
//! by check-then-insert and all aggregate counts use COUNT(DISTINCT user_id)
//! so stray duplicate rows never inflate them.

pub mod user;
pub mod map;
pub mod restaurant;
pub mod diary;
pub mod reply;

pub mod rest_collect;
pub mod rest_like;
pub mod rest_dislike;
pub mod map_collect;
pub mod diary_collect;
pub mod diary_fav;
pub mod follow;

// Re-export all entities
pub use user::Entity as User;
pub use map::Entity as Map;
pub use restaurant::Entity as Restaurant;
pub use diary::Entity as Diary;
pub use reply::Entity as Reply;
pub use rest_collect::Entity as RestCollect;
pub use rest_like::Entity as RestLike;
pub use rest_dislike::Entity as RestDislike;
pub use map_collect::Entity as MapCollect;
pub use diary_collect::Entity as DiaryCollect;
pub use diary_fav::Entity as DiaryFav;
pub use follow::Entity as Follow;

// Re-export active models for easy access
pub use user::ActiveModel as UserActive;
pub use map::ActiveModel as MapActive;
pub use restaurant::ActiveModel as RestaurantActive;
pub use diary::ActiveModel as DiaryActive;
pub use reply::ActiveModel as ReplyActive;
pub use rest_collect::ActiveModel as RestCollectActive;
pub use rest_like::ActiveModel as RestLikeActive;
pub use rest_dislike::ActiveModel as RestDislikeActive;
pub use map_collect::ActiveModel as MapCollectActive;
pub use diary_collect::ActiveModel as DiaryCollectActive;
pub use diary_fav::ActiveModel as DiaryFavActive;
pub use follow::ActiveModel as FollowActive;
