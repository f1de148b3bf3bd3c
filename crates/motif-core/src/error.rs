//! Error types for Motif.

use thiserror::Error;

/// Main error type for Motif operations.
#[derive(Error, Debug)]
pub enum MotifError {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Shader compilation error: {0}")]
    Shader(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Graphics context lost")]
    ContextLost,

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Motif operations.
pub type Result<T> = std::result::Result<T, MotifError>;
