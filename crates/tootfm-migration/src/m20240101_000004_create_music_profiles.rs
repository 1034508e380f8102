use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MusicProfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MusicProfiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MusicProfiles::UserId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    // Text, not jsonb: the playlist generator treats a corrupt
                    // blob as a skippable per-member parse error
                    .col(ColumnDef::new(MusicProfiles::TopTracks).text().not_null())
                    .col(
                        ColumnDef::new(MusicProfiles::TrackCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MusicProfiles::Services)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MusicProfiles::AnalyzedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_music_profiles_user_id")
                            .from(MusicProfiles::Table, MusicProfiles::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MusicProfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum MusicProfiles {
    Table,
    Id,
    UserId,
    TopTracks,
    TrackCount,
    Services,
    AnalyzedAt,
}
