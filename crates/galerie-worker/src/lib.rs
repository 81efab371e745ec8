//! Galerie Worker Library
//!
//! Turns uploaded originals into resized variants under a fixed concurrency
//! ceiling ([`DerivativeQueue`]), rotates an asset's original and variants in
//! place under a per-asset lease ([`RotationCoordinator`]), and re-enqueues
//! work lost to a restart ([`reconcile`]).

pub mod context;
pub mod job;
pub mod queue;
pub mod reconcile;
pub mod rotation;

pub use context::PipelineContext;
pub use job::DerivationJob;
pub use queue::{DerivativeQueue, DerivativeQueueConfig, JobFinishedSender, QueueStatus};
pub use reconcile::{reconcile, requeue};
pub use rotation::{RotationConfig, RotationCoordinator, RotationOutcome, RotationReport};
