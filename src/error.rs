//! Error types for markup-rs.
//!
//! An empty work pool is not an error; see
//! [`crate::db::reservation::NextOutcome`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input (unknown field ids, out-of-range batch settings).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The caller lacks the capability the operation needs.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Edit window elapsed, foreign assessment, or a lost reservation.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
