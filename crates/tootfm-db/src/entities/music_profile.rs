use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A user's unified top-tracks profile, produced by the music analyze
/// step and consumed (read-only) by party playlist generation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "music_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub user_id: Uuid,
    /// JSON-serialized unified track list. Stored as text, not jsonb:
    /// a corrupt blob must surface as a per-member parse error that the
    /// playlist generator can skip, not a write-time constraint.
    #[sea_orm(column_type = "Text")]
    pub top_tracks: String,
    pub track_count: i32,
    /// Service names that contributed to this profile, e.g. ["spotify", "lastfm"].
    #[sea_orm(column_type = "JsonBinary")]
    pub services: Json,
    pub analyzed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
