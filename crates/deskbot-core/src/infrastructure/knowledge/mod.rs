//! SQLite-backed knowledge repository

mod repository;

pub use repository::SqliteKnowledgeRepository;
