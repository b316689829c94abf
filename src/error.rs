use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::{EmbeddingError, VectorIndexError};

/// Main error type for the scholarly engine
#[derive(Error, Debug)]
pub enum ScholarError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index errors
    #[error("Vector index error: {0}")]
    VectorIndex(VectorIndexError),

    /// Index file and mapping file do not belong together
    #[error("Index/mapping mismatch: {0}")]
    IndexMismatch(String),

    /// Index or mapping file missing
    #[error("Index artifact not found: {path}")]
    IndexNotFound { path: PathBuf },

    /// Document rejected at index build time
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Query rejected before execution
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Expert not present in the taxonomy graph
    #[error("Expert not found: {id}")]
    ExpertNotFound { id: String },

    /// Taxonomy graph query failed
    #[error("Taxonomy graph error: {0}")]
    Graph(String),

    /// A bounded call ran out of time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Background task failed to join
    #[error("Task failed: {0}")]
    Task(String),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<VectorIndexError> for ScholarError {
    fn from(err: VectorIndexError) -> Self {
        match err {
            VectorIndexError::Mismatch(message) => ScholarError::IndexMismatch(message),
            VectorIndexError::IndexNotFound(path) => ScholarError::IndexNotFound { path },
            other => ScholarError::VectorIndex(other),
        }
    }
}

impl From<tokio::task::JoinError> for ScholarError {
    fn from(err: tokio::task::JoinError) -> Self {
        ScholarError::Task(err.to_string())
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for scholarly operations
pub type Result<T> = std::result::Result<T, ScholarError>;
