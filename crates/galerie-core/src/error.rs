//! Error types module
//!
//! All pipeline failures are unified under [`AppError`]. Storage and transform
//! crates define their own narrower errors and convert into it at their edges.
//!
//! The `Database` variant carries a `sqlx::Error` when the `sqlx` feature is
//! enabled; without it the variant holds the rendered message instead.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;
use uuid::Uuid;

use crate::models::VariantStatus;
use crate::retry::{is_transient_message, Retryable};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected errors such as validation failures or lock contention
    Debug,
    /// Recoverable issues
    Warn,
    /// Unexpected failures
    Error,
}

/// Metadata describing how an error should be presented to an outer layer
/// (typically the HTTP handler that triggered the operation).
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "ALREADY_IN_PROGRESS")
    fn error_code(&self) -> &'static str;

    /// Whether the caller may retry the same request later
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rotation already in progress for asset {0}")]
    AlreadyInProgress(Uuid),

    #[error("Variant derivation still in progress for asset {0}")]
    DerivationInProgress(Uuid),

    #[error("Invalid status transition for asset {asset_id}: {from} -> {to}")]
    InvalidStatusTransition {
        asset_id: Uuid,
        from: VariantStatus,
        to: VariantStatus,
    },

    #[error("{dependency} unavailable: {message}")]
    DependencyUnavailable {
        dependency: &'static str,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        AppError::InvalidInput(message.into())
    }

    pub fn unavailable(dependency: &'static str, message: impl ToString) -> Self {
        AppError::DependencyUnavailable {
            dependency,
            message: message.to_string(),
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        match err {
            SqlxError::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::Database(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

#[cfg(feature = "sqlx")]
fn sqlx_is_transient(err: &SqlxError) -> bool {
    match err {
        SqlxError::Io(_) | SqlxError::PoolTimedOut | SqlxError::PoolClosed => true,
        SqlxError::Tls(_) | SqlxError::Protocol(_) => true,
        other => is_transient_message(&other.to_string()),
    }
}

impl Retryable for AppError {
    fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            AppError::Database(e) => sqlx_is_transient(e),
            #[cfg(not(feature = "sqlx"))]
            AppError::Database(msg) => is_transient_message(msg),
            AppError::Storage(msg) | AppError::Internal(msg) => is_transient_message(msg),
            AppError::InternalWithSource { message, .. } => is_transient_message(message),
            // Exhausted retries must not be retried again by an outer layer.
            AppError::DependencyUnavailable { .. } => false,
            _ => false,
        }
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        match self {
            AppError::InvalidInput(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::AlreadyInProgress(_) | AppError::DerivationInProgress(_) => 409,
            _ => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::ImageProcessing(_) => "IMAGE_PROCESSING_ERROR",
            AppError::InvalidInput(_) => "INVALID_ARGUMENT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AlreadyInProgress(_) => "ALREADY_IN_PROGRESS",
            AppError::DerivationInProgress(_) => "DERIVATION_IN_PROGRESS",
            AppError::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            AppError::DependencyUnavailable { .. } => "DEPENDENCY_UNAVAILABLE",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "INTERNAL_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::AlreadyInProgress(_)
                | AppError::DerivationInProgress(_)
                | AppError::DependencyUnavailable { .. }
        )
    }

    fn log_level(&self) -> LogLevel {
        match self {
            AppError::InvalidInput(_)
            | AppError::NotFound(_)
            | AppError::AlreadyInProgress(_)
            | AppError::DerivationInProgress(_) => LogLevel::Debug,
            AppError::DependencyUnavailable { .. } | AppError::InvalidStatusTransition { .. } => {
                LogLevel::Warn
            }
            _ => LogLevel::Error,
        }
    }
}
