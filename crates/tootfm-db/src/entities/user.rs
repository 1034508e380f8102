use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::party::Entity")]
    HostedParty,
    #[sea_orm(has_many = "super::party_member::Entity")]
    PartyMember,
    #[sea_orm(has_one = "super::music_profile::Entity")]
    MusicProfile,
}

impl Related<super::party::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HostedParty.def()
    }
}

impl Related<super::party_member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PartyMember.def()
    }
}

impl Related<super::music_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MusicProfile.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
