use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "parties")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Short uppercase alphanumeric join code, e.g. "K7KQ2N".
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    pub host_id: Uuid,
    pub playlist_generated: bool,
    #[sea_orm(default_value = "0")]
    pub total_tracks: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::HostId",
        to = "super::user::Column::Id"
    )]
    Host,
    #[sea_orm(has_many = "super::party_member::Entity")]
    PartyMember,
    #[sea_orm(has_many = "super::party_track::Entity")]
    PartyTrack,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Host.def()
    }
}

impl Related<super::party_member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PartyMember.def()
    }
}

impl Related<super::party_track::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PartyTrack.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
