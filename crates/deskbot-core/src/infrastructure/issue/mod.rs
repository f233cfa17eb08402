//! SQLite-backed issue and auto-reply log stores

mod repository;

pub use repository::{SqliteAutoReplyLogStore, SqliteIssueStore};
