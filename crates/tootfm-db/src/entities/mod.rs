pub mod music_profile;
pub mod party;
pub mod party_member;
pub mod party_track;
pub mod user;
