//! Initial migration to create all tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::AvatarUrl).string())
                    .col(ColumnDef::new(Users::MapId).integer())
                    .col(ColumnDef::new(Users::Created).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Create maps table
        manager
            .create_table(
                Table::create()
                    .table(Maps::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Maps::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Maps::Name).string().not_null())
                    .col(ColumnDef::new(Maps::Lat).double().not_null())
                    .col(ColumnDef::new(Maps::Lng).double().not_null())
                    .col(ColumnDef::new(Maps::IconUrl).string())
                    .col(ColumnDef::new(Maps::Author).integer().not_null())
                    .col(ColumnDef::new(Maps::Tags).json().not_null())
                    .col(ColumnDef::new(Maps::RestIds).json().not_null())
                    .col(ColumnDef::new(Maps::Created).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Maps::Table, Maps::Author)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Create restaurants table, keyed by the external place id
        manager
            .create_table(
                Table::create()
                    .table(Restaurants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Restaurants::PlaceId).string().not_null().primary_key())
                    .col(ColumnDef::new(Restaurants::Name).string().not_null())
                    .col(ColumnDef::new(Restaurants::Lat).double().not_null())
                    .col(ColumnDef::new(Restaurants::Lng).double().not_null())
                    .col(ColumnDef::new(Restaurants::Rating).double().not_null().default(0.0))
                    .col(ColumnDef::new(Restaurants::UserRatingsTotal).integer())
                    .col(ColumnDef::new(Restaurants::Address).string())
                    .col(ColumnDef::new(Restaurants::Telephone).string())
                    .col(ColumnDef::new(Restaurants::PhotoUrl).string())
                    .col(ColumnDef::new(Restaurants::Types).json().not_null())
                    .col(ColumnDef::new(Restaurants::PriceLevel).integer())
                    .col(ColumnDef::new(Restaurants::Created).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Create diaries table
        manager
            .create_table(
                Table::create()
                    .table(Diaries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Diaries::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Diaries::UserId).integer().not_null())
                    .col(ColumnDef::new(Diaries::RestId).string().not_null())
                    .col(ColumnDef::new(Diaries::Content).string().not_null())
                    .col(ColumnDef::new(Diaries::Items).json().not_null())
                    .col(ColumnDef::new(Diaries::Photos).json().not_null())
                    .col(ColumnDef::new(Diaries::Created).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Diaries::Table, Diaries::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Diaries::Table, Diaries::RestId)
                            .to(Restaurants::Table, Restaurants::PlaceId),
                    )
                    .to_owned(),
            )
            .await?;

        // Create replies table
        manager
            .create_table(
                Table::create()
                    .table(Replies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Replies::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Replies::DiaryId).integer().not_null())
                    .col(ColumnDef::new(Replies::Author).integer().not_null())
                    .col(ColumnDef::new(Replies::Content).string().not_null())
                    .col(ColumnDef::new(Replies::Created).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Replies::Table, Replies::DiaryId)
                            .to(Diaries::Table, Diaries::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Edge tables: surrogate key, no unique (user, target) constraint.
        // Counts are COUNT(DISTINCT user_id) so duplicate rows stay harmless.
        manager
            .create_table(
                Table::create()
                    .table(RestCollects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RestCollects::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(RestCollects::UserId).integer().not_null())
                    .col(ColumnDef::new(RestCollects::RestId).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RestLikes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RestLikes::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(RestLikes::UserId).integer().not_null())
                    .col(ColumnDef::new(RestLikes::RestId).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RestDislikes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RestDislikes::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(RestDislikes::UserId).integer().not_null())
                    .col(ColumnDef::new(RestDislikes::RestId).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MapCollects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(MapCollects::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(MapCollects::UserId).integer().not_null())
                    .col(ColumnDef::new(MapCollects::MapId).integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DiaryCollects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DiaryCollects::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(DiaryCollects::UserId).integer().not_null())
                    .col(ColumnDef::new(DiaryCollects::DiaryId).integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DiaryFavs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DiaryFavs::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(DiaryFavs::UserId).integer().not_null())
                    .col(ColumnDef::new(DiaryFavs::DiaryId).integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Follows::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Follows::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Follows::Follower).integer().not_null())
                    .col(ColumnDef::new(Follows::Followee).integer().not_null())
                    .to_owned(),
            )
            .await?;

        // Lookup indexes for the edge tables (existence checks and joins)
        manager
            .create_index(
                Index::create()
                    .name("idx_rest_collects_user_rest")
                    .table(RestCollects::Table)
                    .col(RestCollects::UserId)
                    .col(RestCollects::RestId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rest_likes_user_rest")
                    .table(RestLikes::Table)
                    .col(RestLikes::UserId)
                    .col(RestLikes::RestId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rest_dislikes_user_rest")
                    .table(RestDislikes::Table)
                    .col(RestDislikes::UserId)
                    .col(RestDislikes::RestId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_map_collects_user_map")
                    .table(MapCollects::Table)
                    .col(MapCollects::UserId)
                    .col(MapCollects::MapId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_diary_collects_user_diary")
                    .table(DiaryCollects::Table)
                    .col(DiaryCollects::UserId)
                    .col(DiaryCollects::DiaryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_diary_favs_user_diary")
                    .table(DiaryFavs::Table)
                    .col(DiaryFavs::UserId)
                    .col(DiaryFavs::DiaryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_follows_follower_followee")
                    .table(Follows::Table)
                    .col(Follows::Follower)
                    .col(Follows::Followee)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Follows::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(DiaryFavs::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(DiaryCollects::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(MapCollects::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(RestDislikes::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(RestLikes::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(RestCollects::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Replies::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Diaries::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Restaurants::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Maps::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Users::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Name,
    Email,
    AvatarUrl,
    MapId,
    Created,
}

#[derive(DeriveIden)]
enum Maps {
    Table,
    Id,
    Name,
    Lat,
    Lng,
    IconUrl,
    Author,
    Tags,
    RestIds,
    Created,
}

#[derive(DeriveIden)]
enum Restaurants {
    Table,
    PlaceId,
    Name,
    Lat,
    Lng,
    Rating,
    UserRatingsTotal,
    Address,
    Telephone,
    PhotoUrl,
    Types,
    PriceLevel,
    Created,
}

#[derive(DeriveIden)]
enum Diaries {
    Table,
    Id,
    UserId,
    RestId,
    Content,
    Items,
    Photos,
    Created,
}

#[derive(DeriveIden)]
enum Replies {
    Table,
    Id,
    DiaryId,
    Author,
    Content,
    Created,
}

#[derive(DeriveIden)]
enum RestCollects {
    Table,
    Id,
    UserId,
    RestId,
}

#[derive(DeriveIden)]
enum RestLikes {
    Table,
    Id,
    UserId,
    RestId,
}

#[derive(DeriveIden)]
enum RestDislikes {
    Table,
    Id,
    UserId,
    RestId,
}

#[derive(DeriveIden)]
enum MapCollects {
    Table,
    Id,
    UserId,
    MapId,
}

#[derive(DeriveIden)]
enum DiaryCollects {
    Table,
    Id,
    UserId,
    DiaryId,
}

#[derive(DeriveIden)]
enum DiaryFavs {
    Table,
    Id,
    UserId,
    DiaryId,
}

#[derive(DeriveIden)]
enum Follows {
    Table,
    Id,
    Follower,
    Followee,
}
