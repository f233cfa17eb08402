//! Error types for Deskbot

use thiserror::Error;

/// Result type alias using Deskbot's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Deskbot error types
///
/// The retrieval and decision pipeline recovers from most of these locally:
/// retrieval errors degrade to the next tier, generator and decode errors
/// map to a "cannot answer" outcome, and persistence errors on usage
/// counters or audit logs are swallowed. None of them abort message
/// processing.
#[derive(Error, Debug)]
pub enum Error {
    // Retrieval errors
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    // Generator errors
    #[error("Answer generator error: {0}")]
    Generator(String),

    #[error("Failed to decode generator output: {0}")]
    Decode(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
