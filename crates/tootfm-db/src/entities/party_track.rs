use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One generated playlist entry, scoped to a party.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "party_tracks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub party_id: Uuid,
    pub name: String,
    pub artist: String,
    pub album: Option<String>,
    /// User IDs whose profiles contained this track, in discovery order.
    #[sea_orm(column_type = "JsonBinary")]
    pub sources: Json,
    pub match_score: i32,
    #[sea_orm(default_value = "0")]
    pub vote_count: i32,
    pub position: i32,
    pub spotify_id: Option<String>,
    pub lastfm_id: Option<String>,
    pub apple_id: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::party::Entity",
        from = "Column::PartyId",
        to = "super::party::Column::Id"
    )]
    Party,
}

impl Related<super::party::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Party.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
