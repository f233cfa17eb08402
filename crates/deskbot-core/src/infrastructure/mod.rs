//! Infrastructure layer
//!
//! SQLite implementations of the domain repository traits.

pub mod groups;
pub mod issue;
pub mod knowledge;

pub use groups::SqliteGroupConfigProvider;
pub use issue::{SqliteAutoReplyLogStore, SqliteIssueStore};
pub use knowledge::SqliteKnowledgeRepository;
