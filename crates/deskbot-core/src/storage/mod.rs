//! Storage layer - SQLite
//!
//! Provides database management and migrations for deskbot.
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig};
pub use migrations::{run_migrations, CURRENT_VERSION};
