use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_users::Users;
use super::m20240101_000002_create_parties::Parties;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PartyMembers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PartyMembers::PartyId).uuid().not_null())
                    .col(ColumnDef::new(PartyMembers::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(PartyMembers::JoinedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(PartyMembers::PartyId)
                            .col(PartyMembers::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_party_members_party_id")
                            .from(PartyMembers::Table, PartyMembers::PartyId)
                            .to(Parties::Table, Parties::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_party_members_user_id")
                            .from(PartyMembers::Table, PartyMembers::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_party_members_user_id")
                    .table(PartyMembers::Table)
                    .col(PartyMembers::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PartyMembers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum PartyMembers {
    Table,
    PartyId,
    UserId,
    JoinedAt,
}
