pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_users;
mod m20240101_000002_create_parties;
mod m20240101_000003_create_party_members;
mod m20240101_000004_create_music_profiles;
mod m20240101_000005_create_party_tracks;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users::Migration),
            Box::new(m20240101_000002_create_parties::Migration),
            Box::new(m20240101_000003_create_party_members::Migration),
            Box::new(m20240101_000004_create_music_profiles::Migration),
            Box::new(m20240101_000005_create_party_tracks::Migration),
        ]
    }
}
