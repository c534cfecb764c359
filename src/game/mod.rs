pub mod gameplay;
pub mod judgment;
pub mod note;
pub mod profile;
pub mod scores;
