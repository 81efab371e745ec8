use crate::context::PipelineContext;
use crate::job::{self, DerivationJob};
use galerie_core::{AppError, PipelineConfig, VariantStatus};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// Receives `(asset_id, final_status)` once per finished job.
pub type JobFinishedSender = mpsc::UnboundedSender<(Uuid, VariantStatus)>;

#[derive(Debug, Clone)]
pub struct DerivativeQueueConfig {
    pub max_concurrent: usize,
}

impl Default for DerivativeQueueConfig {
    fn default() -> Self {
        Self { max_concurrent: 2 }
    }
}

impl DerivativeQueueConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            max_concurrent: config.derivative_max_concurrent,
        }
    }
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub running_count: usize,
    pub max_concurrent: usize,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<DerivationJob>,
    running: usize,
}

struct Inner {
    ctx: PipelineContext,
    config: DerivativeQueueConfig,
    state: Mutex<QueueState>,
    idle: Notify,
    finished_tx: Option<JobFinishedSender>,
    runtime: Handle,
}

/// FIFO derivation queue with at most `max_concurrent` jobs running.
///
/// Jobs live only in memory; anything pending at shutdown is recovered by
/// [`crate::reconcile`] from the stored statuses.
#[derive(Clone)]
pub struct DerivativeQueue {
    inner: Arc<Inner>,
}

/// Frees a running slot when the job task ends, including by panic.
struct RunningSlot {
    queue: DerivativeQueue,
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        self.queue.release_slot();
    }
}

impl DerivativeQueue {
    /// Create a queue bound to the current Tokio runtime.
    pub fn new(ctx: PipelineContext, config: DerivativeQueueConfig) -> Result<Self, AppError> {
        Self::build(ctx, config, None)
    }

    pub fn with_finished_sender(
        ctx: PipelineContext,
        config: DerivativeQueueConfig,
        finished_tx: JobFinishedSender,
    ) -> Result<Self, AppError> {
        Self::build(ctx, config, Some(finished_tx))
    }

    fn build(
        ctx: PipelineContext,
        config: DerivativeQueueConfig,
        finished_tx: Option<JobFinishedSender>,
    ) -> Result<Self, AppError> {
        if config.max_concurrent == 0 {
            return Err(AppError::invalid_input("max_concurrent must be at least 1"));
        }
        let runtime = Handle::try_current().map_err(|e| {
            AppError::Internal(format!("derivative queue needs a Tokio runtime: {}", e))
        })?;

        tracing::info!(
            max_concurrent = config.max_concurrent,
            variants = ctx.variants.len(),
            "Derivative queue started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                ctx,
                config,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
                finished_tx,
                runtime,
            }),
        })
    }

    /// Append a job and return immediately.
    pub fn enqueue(
        &self,
        asset_id: Uuid,
        original_key: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Result<(), AppError> {
        self.enqueue_job(DerivationJob::new(asset_id, original_key, mime_type)?)
    }

    pub fn enqueue_job(&self, job: DerivationJob) -> Result<(), AppError> {
        job.validate()?;

        let queue_length = {
            let mut state = self.state();
            state.pending.push_back(job.clone());
            state.pending.len()
        };
        tracing::debug!(asset_id = %job.asset_id, queue_length, "Derivation job enqueued");

        self.admit();
        Ok(())
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.state();
        QueueStatus {
            queue_length: state.pending.len(),
            running_count: state.running,
            max_concurrent: self.inner.config.max_concurrent,
        }
    }

    pub fn is_idle(&self) -> bool {
        let state = self.state();
        state.pending.is_empty() && state.running == 0
    }

    /// Resolve once nothing is pending or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        // Never held across an await; a poisoned guard still has consistent counters.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start pending jobs while slots are free.
    fn admit(&self) {
        let admitted: Vec<DerivationJob> = {
            let mut state = self.state();
            let mut admitted = Vec::new();
            while state.running < self.inner.config.max_concurrent {
                match state.pending.pop_front() {
                    Some(job) => {
                        state.running += 1;
                        admitted.push(job);
                    }
                    None => break,
                }
            }
            admitted
        };

        for job in admitted {
            self.spawn(job);
        }
    }

    fn spawn(&self, job: DerivationJob) {
        let slot = RunningSlot {
            queue: self.clone(),
        };

        self.inner.runtime.spawn(async move {
            let status = job::run(&slot.queue.inner.ctx, &job).await;

            if let Some(tx) = &slot.queue.inner.finished_tx {
                if tx.send((job.asset_id, status)).is_err() {
                    tracing::debug!(asset_id = %job.asset_id, "Job finished receiver dropped");
                }
            }
            drop(slot);
        });
    }

    fn release_slot(&self) {
        {
            let mut state = self.state();
            state.running = state.running.saturating_sub(1);
        }
        self.admit();

        if self.is_idle() {
            self.inner.idle.notify_waiters();
        }
    }
}
