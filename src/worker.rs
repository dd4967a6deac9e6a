use crate::error::{Error, Result};
use crate::executor::OperationExecutor;
use crate::metrics::{MetricsStore, WorkerStatus};
use crate::supervisor::CancelSignal;
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Inclusive range the pause after each operation is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    min: Duration,
    max: Duration,
}

impl DelayPolicy {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(Error::Config(format!(
                "delay minimum {:?} exceeds maximum {:?}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn fixed(delay: Duration) -> Self {
        Self { min: delay, max: delay }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Millisecond resolution, uniform over `[min, max]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed,
    Cancelled,
}

/// Calls `mark_finished` when dropped, whichever way the worker exits.
struct FinishGuard {
    store: Arc<MetricsStore>,
    worker_id: u32,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.store.mark_finished(self.worker_id);
    }
}

pub struct Worker {
    id: u32,
    operations: u32,
    target: Arc<str>,
    executor: Arc<dyn OperationExecutor>,
    store: Arc<MetricsStore>,
    cancel: CancelSignal,
    delay: DelayPolicy,
    rng: StdRng,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        operations: u32,
        target: Arc<str>,
        executor: Arc<dyn OperationExecutor>,
        store: Arc<MetricsStore>,
        cancel: CancelSignal,
        delay: DelayPolicy,
        rng: StdRng,
    ) -> Self {
        Self {
            id,
            operations,
            target,
            executor,
            store,
            cancel,
            delay,
            rng,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub async fn run(mut self) -> WorkerOutcome {
        self.store.mark_active(self.id);
        let _finish = FinishGuard {
            store: self.store.clone(),
            worker_id: self.id,
        };

        for current in 1..=self.operations {
            if self.cancel.is_cancelled() {
                return self.stop();
            }

            self.store.set_status(
                self.id,
                WorkerStatus::Operation {
                    current,
                    total: self.operations,
                },
            );

            match self.executor.perform_action(&self.target).await {
                Ok(()) => self.store.record_success(self.id),
                Err(e) => {
                    log::debug!("Worker #{} operation {} failed: {}", self.id, current, e);
                    self.store.record_failure(self.id, &e.short_description());
                }
            }

            let delay = self.delay.sample(&mut self.rng);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.stop(),
                _ = sleep(delay) => {}
            }
        }

        self.store.set_status(self.id, WorkerStatus::Finished);
        log::debug!("Worker #{} finished {} operations", self.id, self.operations);
        WorkerOutcome::Completed
    }

    fn stop(&self) -> WorkerOutcome {
        self.store.set_status(self.id, WorkerStatus::Stopped);
        log::debug!("Worker #{} stopped", self.id);
        WorkerOutcome::Cancelled
    }
}
