use crate::executor::OperationExecutor;
use crate::metrics::MetricsStore;
use crate::output::{PresentationSink, RenderFrame};
use crate::supervisor::{CancelSignal, RunState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    AllFinished,
    Cancelled,
}

/// Periodically refreshes the target counter, recomputes derived metrics
/// and hands a snapshot to every sink. Never touches raw counters.
pub struct Poller {
    executor: Arc<dyn OperationExecutor>,
    store: Arc<MetricsStore>,
    cancel: CancelSignal,
    target_id: String,
    workers: u32,
    interval: Duration,
    sinks: Vec<Box<dyn PresentationSink>>,
    run_state: Option<watch::Receiver<RunState>>,
}

impl Poller {
    pub fn new(
        executor: Arc<dyn OperationExecutor>,
        store: Arc<MetricsStore>,
        cancel: CancelSignal,
        target_id: impl Into<String>,
        workers: u32,
        interval: Duration,
    ) -> Self {
        Self {
            executor,
            store,
            cancel,
            target_id: target_id.into(),
            workers,
            interval,
            sinks: Vec::new(),
            run_state: None,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn PresentationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// After cancellation, hold the closing frame until the run has stopped so
    /// sinks see every worker's final bookkeeping.
    pub fn follow_run(mut self, run_state: watch::Receiver<RunState>) -> Self {
        self.run_state = Some(run_state);
        self
    }

    /// One refresh: read the counter, recompute, render. Returns the frame rendered.
    pub async fn tick(&mut self) -> RenderFrame {
        match self.executor.read_counter(&self.target_id).await {
            Ok(value) => self.store.recompute_derived(value),
            Err(e) => log::debug!("Counter read failed, keeping previous values: {}", e),
        }

        let frame = self.frame();
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.render(&frame).await {
                log::warn!("Render failed: {}", e);
            }
        }
        frame
    }

    fn frame(&self) -> RenderFrame {
        RenderFrame {
            target_id: self.target_id.clone(),
            workers: self.workers,
            snapshot: self.store.snapshot(),
        }
    }

    /// Runs until every worker has finished or the cancel signal fires, then
    /// closes the sinks with a final frame. The derived metrics are refreshed
    /// only by successful counter reads.
    pub async fn run(mut self) -> PollOutcome {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break PollOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            let frame = self.tick().await;
            if frame.snapshot.finished_workers >= u64::from(self.workers) {
                break PollOutcome::AllFinished;
            }
        };

        if outcome == PollOutcome::Cancelled {
            if let Some(run_state) = self.run_state.as_mut() {
                // Err means the supervisor is gone; its workers are done either way.
                let _ = run_state.wait_for(|state| *state == RunState::Stopped).await;
            }
        }

        let frame = self.frame();
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.close(&frame).await {
                log::warn!("Closing output failed: {}", e);
            }
        }
        log::debug!("Poller exited: {:?}", outcome);
        outcome
    }
}
