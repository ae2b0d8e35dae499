//! Error types for the internet learning core
//!
//! Errors that cross module boundaries are collected in [`LearningError`].
//! Backend-level network errors live in [`crate::fetcher::FetchError`] and
//! never escape the fetcher.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, LearningError>;

/// Errors raised inside the learning core
#[derive(Debug, Error)]
pub enum LearningError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid fact: {0}")]
    InvalidFact(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Illegal state transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for LearningError {
    fn from(err: config::ConfigError) -> Self {
        LearningError::Config(err.to_string())
    }
}
