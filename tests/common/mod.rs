#![allow(dead_code)]

use async_trait::async_trait;
use loadpool::output::{PresentationSink, RenderFrame};
use loadpool::{Error, OperationExecutor, Result};
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory executor: fails chosen call numbers (1-based, across all
/// workers), optionally at random, with optional latency. Can also panic
/// on one chosen call.
#[derive(Default)]
pub struct ScriptedExecutor {
    calls: AtomicU64,
    fail_calls: HashSet<u64>,
    failure_ratio: f64,
    latency: Option<(u64, u64)>,
    counter: Option<u64>,
    counter_reads: AtomicU64,
    panic_on: Option<u64>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_calls(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.fail_calls = calls.into_iter().collect();
        self
    }

    pub fn failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio;
        self
    }

    pub fn latency_ms(mut self, min: u64, max: u64) -> Self {
        self.latency = Some((min, max));
        self
    }

    /// Panics inside the executor on the given call number.
    pub fn panicking_call(mut self, call: u64) -> Self {
        self.panic_on = Some(call);
        self
    }

    pub fn counter(mut self, value: u64) -> Self {
        self.counter = Some(value);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn counter_reads(&self) -> u64 {
        self.counter_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperationExecutor for ScriptedExecutor {
    async fn perform_action(&self, _target: &str) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on == Some(call) {
            panic!("scripted panic on call {}", call);
        }

        let (latency, random_failure) = {
            let mut rng = rand::thread_rng();
            let latency = self.latency.map(|(min, max)| rng.gen_range(min..=max));
            (latency, self.failure_ratio > 0.0 && rng.gen_bool(self.failure_ratio))
        };
        if let Some(ms) = latency {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        if self.fail_calls.contains(&call) || random_failure {
            return Err(Error::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(())
    }

    async fn read_counter(&self, _target_id: &str) -> Result<u64> {
        self.counter_reads.fetch_add(1, Ordering::SeqCst);
        self.counter
            .ok_or_else(|| Error::Counter("scripted counter unavailable".to_string()))
    }
}

/// Sink that keeps every frame it is given.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub rendered: Arc<Mutex<Vec<RenderFrame>>>,
    pub closed: Arc<Mutex<Option<RenderFrame>>>,
}

#[async_trait]
impl PresentationSink for RecordingSink {
    async fn render(&mut self, frame: &RenderFrame) -> Result<()> {
        self.rendered.lock().unwrap().push(frame.clone());
        Ok(())
    }

    async fn close(&mut self, frame: &RenderFrame) -> Result<()> {
        *self.closed.lock().unwrap() = Some(frame.clone());
        Ok(())
    }
}
