//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use galerie_core::{is_transient_message, AppError, Retryable};
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Transient failures persisted through every retry attempt.
    #[error("Storage unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl Retryable for StorageError {
    fn is_transient(&self) -> bool {
        match self {
            StorageError::UploadFailed(msg)
            | StorageError::DownloadFailed(msg)
            | StorageError::DeleteFailed(msg)
            | StorageError::BackendError(msg) => is_transient_message(msg),
            StorageError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            StorageError::NotFound(_)
            | StorageError::InvalidKey(_)
            | StorageError::ConfigError(_)
            | StorageError::Unavailable { .. } => false,
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("storage object {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::Unavailable { .. } => AppError::unavailable("object-store", err),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem, memory) implement this trait.
/// The pipeline only needs whole-object reads and writes: originals and
/// derived images are small enough to hold in memory.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a whole object. Missing keys yield [`StorageError::NotFound`].
    async fn get(&self, storage_key: &str) -> StorageResult<Bytes>;

    /// Write a whole object, replacing any previous content at `storage_key`.
    async fn put(&self, storage_key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Delete an object by its storage key
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Publicly accessible URL for an object (without cache busting)
    fn public_url(&self, storage_key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
