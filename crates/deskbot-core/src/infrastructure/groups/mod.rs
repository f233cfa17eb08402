//! SQLite-backed group configuration

mod repository;

pub use repository::SqliteGroupConfigProvider;
