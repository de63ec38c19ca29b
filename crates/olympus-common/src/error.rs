//! Application error types for Olympus services.

use thiserror::Error;

/// Main application error type used across Olympus worker services.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request validation failed
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Redis error
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    InternalError(String),

    /// External service error
    #[error("External service error: {0}")]
    ExternalServiceError(String),

    /// File I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    TimeoutError(String),

    /// Queue error
    #[error("Queue error: {0}")]
    QueueError(String),
}

impl AppError {
    /// Returns a stable error code string for logging/metrics labels.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::CacheError(_) => "CACHE_ERROR",
            AppError::InternalError(_) => "INTERNAL_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::FileError(_) => "FILE_ERROR",
            AppError::SerializationError(_) => "SERIALIZATION_ERROR",
            AppError::TimeoutError(_) => "TIMEOUT_ERROR",
            AppError::QueueError(_) => "QUEUE_ERROR",
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
