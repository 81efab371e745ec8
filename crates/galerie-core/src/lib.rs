//! Galerie Core Library
//!
//! This crate provides the domain models, error types, retry policy and
//! configuration shared by every component of the derivative pipeline.

pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod storage_types;

// Re-export commonly used types
pub use config::{PipelineConfig, RotationInFlightPolicy};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{Asset, VariantSet, VariantSpec, VariantStatus};
pub use retry::{is_transient_message, RetryConfig, RetryPolicy, Retryable};
pub use storage_types::StorageBackend;
