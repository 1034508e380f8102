use sea_orm_migration::prelude::*;

use super::m20240101_000002_create_parties::Parties;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PartyTracks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PartyTracks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PartyTracks::PartyId).uuid().not_null())
                    .col(ColumnDef::new(PartyTracks::Name).string_len(512).not_null())
                    .col(
                        ColumnDef::new(PartyTracks::Artist)
                            .string_len(512)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PartyTracks::Album).string_len(512).null())
                    .col(
                        ColumnDef::new(PartyTracks::Sources)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PartyTracks::MatchScore)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PartyTracks::VoteCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(PartyTracks::Position).integer().not_null())
                    .col(ColumnDef::new(PartyTracks::SpotifyId).string_len(64).null())
                    .col(ColumnDef::new(PartyTracks::LastfmId).string_len(64).null())
                    .col(ColumnDef::new(PartyTracks::AppleId).string_len(64).null())
                    .col(
                        ColumnDef::new(PartyTracks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_party_tracks_party_id")
                            .from(PartyTracks::Table, PartyTracks::PartyId)
                            .to(Parties::Table, Parties::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_party_tracks_party_id")
                    .table(PartyTracks::Table)
                    .col(PartyTracks::PartyId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PartyTracks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum PartyTracks {
    Table,
    Id,
    PartyId,
    Name,
    Artist,
    Album,
    Sources,
    MatchScore,
    VoteCount,
    Position,
    SpotifyId,
    LastfmId,
    AppleId,
    CreatedAt,
}
