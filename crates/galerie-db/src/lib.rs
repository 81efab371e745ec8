//! Galerie DB Library
//!
//! Persistence of asset variant status and rotation leases. The
//! [`AssetStatusStore`] trait is what the pipeline depends on; PostgreSQL and
//! in-memory implementations are provided, plus a retrying wrapper.

pub mod setup;
pub mod store;

pub use setup::setup_database;
pub use store::{
    AssetStatusStore, InMemoryAssetStore, PostgresAssetStore, RetryingAssetStore,
};
