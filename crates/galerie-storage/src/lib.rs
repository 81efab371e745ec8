//! Galerie Storage Library
//!
//! Object storage abstraction for the derivative pipeline: the [`Storage`]
//! trait, filesystem, S3 and in-memory backends, and a retrying wrapper that
//! every pipeline component goes through.
//!
//! # Storage key format
//!
//! Originals live at `media/{uuid}.{ext}`. A derived variant lives next to its
//! original with `@{width}` inserted before the extension, e.g.
//! `media/3f2a.jpg` -> `media/3f2a@300.jpg`. Derived keys are never stored;
//! they are recomputed with [`keys::derive_key`].
//!
//! Keys must not contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
pub mod retrying;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use galerie_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use retrying::RetryingStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
