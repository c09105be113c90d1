//! Error handling module
//!
//! Provides unified error types and handling for the entire application.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Description service error: {0}")]
    Service(#[from] reqwest::Error),

    #[error("Description service returned an unusable payload: {0}")]
    MalformedResponse(String),

    #[error("Invalid namespace: {0}")]
    Namespace(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
