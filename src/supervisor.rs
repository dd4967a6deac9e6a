use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::executor::OperationExecutor;
use crate::metrics::{MetricsSnapshot, MetricsStore};
use crate::worker::{DelayPolicy, Worker, WorkerOutcome};
use futures::future::join_all;
use futures::stream::{Stream, StreamExt};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;

/// Broadcast stop request shared by the supervisor, every worker and the poller.
/// Once set it stays set.
#[derive(Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that actually fired the signal.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has fired, immediately if it already has.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Cancelling,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub workers: u32,
    pub operations_per_worker: u32,
    pub delay: DelayPolicy,
    pub stagger: Duration,
    pub seed: u64,
}

impl SupervisorSettings {
    pub fn new(workers: u32, operations_per_worker: u32, delay: DelayPolicy) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Config("worker count must be positive".to_string()));
        }
        if operations_per_worker == 0 {
            return Err(Error::Config("operations per worker must be positive".to_string()));
        }
        Ok(Self {
            workers,
            operations_per_worker,
            delay,
            stagger: Duration::from_millis(50),
            seed: rand::random(),
        })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let (min, max) = config.delay_range();
        let mut settings = Self::new(
            config.workers,
            config.operations_per_worker,
            DelayPolicy::new(min, max)?,
        )?
        .with_stagger(config.stagger());
        if let Some(seed) = config.seed {
            settings = settings.with_seed(seed);
        }
        Ok(settings)
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn target_total(&self) -> u64 {
        u64::from(self.workers) * u64::from(self.operations_per_worker)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub snapshot: MetricsSnapshot,
    pub completed_workers: u32,
    pub stopped_workers: u32,
    pub cancelled: bool,
    pub duration: Duration,
}

pub struct Supervisor {
    settings: SupervisorSettings,
    executor: Arc<dyn OperationExecutor>,
    store: Arc<MetricsStore>,
    cancel: CancelSignal,
    state_watcher: watch::Sender<RunState>,
}

impl Supervisor {
    pub fn new(
        settings: SupervisorSettings,
        executor: Arc<dyn OperationExecutor>,
        store: Arc<MetricsStore>,
    ) -> Self {
        let (state_tx, _) = watch::channel(RunState::NotStarted);

        Self {
            settings,
            executor,
            store,
            cancel: CancelSignal::new(),
            state_watcher: state_tx,
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn store(&self) -> Arc<MetricsStore> {
        self.store.clone()
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Asks every worker to stop at its next checkpoint. Idempotent.
    pub fn cancel(&self) -> bool {
        let fired = self.cancel.cancel();
        if fired {
            log::info!("Cancellation requested");
            self.enter_cancelling();
        }
        fired
    }

    /// Cancels the run on the first interrupt. Returns `true` if a second
    /// interrupt arrives, `false` if the stream ends first.
    pub async fn cancel_on_interrupts<S>(&self, interrupts: S) -> bool
    where
        S: Stream<Item = ()>,
    {
        let mut interrupts = std::pin::pin!(interrupts);
        if interrupts.next().await.is_none() {
            return false;
        }
        log::info!("Shutting down...");
        self.cancel();

        if interrupts.next().await.is_none() {
            return false;
        }
        log::warn!("Second interrupt, exiting without waiting for in-flight requests");
        true
    }

    pub fn state(&self) -> RunState {
        *self.state_watcher.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.state_watcher.subscribe()
    }

    /// Launches every worker against `target` and waits for all of them to finish.
    pub async fn run(&self, target: &str) -> Result<RunSummary> {
        if self.state() != RunState::NotStarted {
            return Err(Error::Internal("supervisor has already been started".to_string()));
        }
        self.set_state(RunState::Running);

        let started = Instant::now();
        let target: Arc<str> = Arc::from(target);
        self.store.begin_run();
        log::info!(
            "Launching {} workers x {} operations (seed {})",
            self.settings.workers,
            self.settings.operations_per_worker,
            self.settings.seed
        );

        let mut handles = Vec::with_capacity(self.settings.workers as usize);
        for id in 1..=self.settings.workers {
            let worker = Worker::new(
                id,
                self.settings.operations_per_worker,
                target.clone(),
                self.executor.clone(),
                self.store.clone(),
                self.cancel.clone(),
                self.settings.delay,
                StdRng::seed_from_u64(self.settings.seed.wrapping_add(u64::from(id))),
            );
            handles.push(tokio::spawn(worker.run()));

            // Spread launches out; skip the remaining pauses once cancelled.
            if id < self.settings.workers && !self.settings.stagger.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = sleep(self.settings.stagger) => {}
                }
            }
        }

        let joined = join_all(handles);
        tokio::pin!(joined);
        let results = tokio::select! {
            results = &mut joined => results,
            _ = self.cancel.cancelled() => {
                self.enter_cancelling();
                joined.await
            }
        };

        let mut completed_workers = 0;
        let mut stopped_workers = 0;
        for result in results {
            match result {
                Ok(WorkerOutcome::Completed) => completed_workers += 1,
                Ok(WorkerOutcome::Cancelled) => stopped_workers += 1,
                Err(e) => log::error!("Worker task failed: {}", e),
            }
        }

        self.set_state(RunState::Stopped);
        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            log::info!("Run stopped: {} completed, {} stopped", completed_workers, stopped_workers);
        } else {
            log::info!("All {} workers finished", completed_workers);
        }

        Ok(RunSummary {
            snapshot: self.store.snapshot(),
            completed_workers,
            stopped_workers,
            cancelled,
            duration: started.elapsed(),
        })
    }

    fn enter_cancelling(&self) {
        self.state_watcher.send_if_modified(|state| {
            if *state == RunState::Running {
                *state = RunState::Cancelling;
                true
            } else {
                false
            }
        });
    }

    fn set_state(&self, state: RunState) {
        self.state_watcher.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_fires_once() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());
        assert!(signal.cancel());
        assert!(!signal.cancel());
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_for_late_waiters() {
        let signal = CancelSignal::new();
        signal.cancel();
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("already-fired signal should resolve immediately");
    }

    fn idle_supervisor() -> Supervisor {
        struct Noop;

        #[async_trait::async_trait]
        impl OperationExecutor for Noop {
            async fn perform_action(&self, _target: &str) -> Result<()> {
                Ok(())
            }

            async fn read_counter(&self, _target_id: &str) -> Result<u64> {
                Ok(0)
            }
        }

        let settings = SupervisorSettings::new(1, 1, DelayPolicy::fixed(Duration::ZERO)).unwrap();
        Supervisor::new(settings, Arc::new(Noop), Arc::new(MetricsStore::new(1)))
    }

    #[tokio::test]
    async fn first_interrupt_cancels_second_requests_exit() {
        let sup = idle_supervisor();
        let force_exit = sup.cancel_on_interrupts(futures::stream::iter([(), ()])).await;
        assert!(force_exit);
        assert!(sup.cancel_signal().is_cancelled());
    }

    #[tokio::test]
    async fn single_interrupt_only_cancels() {
        let sup = idle_supervisor();
        assert!(!sup.cancel_on_interrupts(futures::stream::iter([()])).await);
        assert!(sup.cancel_signal().is_cancelled());

        let untouched = idle_supervisor();
        assert!(!untouched.cancel_on_interrupts(futures::stream::empty()).await);
        assert!(!untouched.cancel_signal().is_cancelled());
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let err = SupervisorSettings::new(0, 3, DelayPolicy::fixed(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
