//! Domain layer
//!
//! Contains the core business logic and domain models.

pub mod conversation;
pub mod decision;
pub mod issue;
pub mod knowledge;
