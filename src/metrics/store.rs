use crate::metrics::snapshot::{DerivedMetrics, MetricsSnapshot, WorkerRecord, WorkerStatus};
use chrono::{DateTime, Local};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Shared per-worker and global counters for one run.
///
/// Every operation takes the single store lock, so a reader never sees a
/// worker counter updated without the matching global total.
pub struct MetricsStore {
    state: Mutex<StoreState>,
}

struct StoreState {
    workers: BTreeMap<u32, WorkerRecord>,
    finished_ids: BTreeSet<u32>,
    total_successful: u64,
    total_failed: u64,
    active_workers: u64,
    finished_workers: u64,
    proxies_available: u64,
    target_total: u64,
    initial_counter: u64,
    started_at: Instant,
    started_wall: DateTime<Local>,
    derived: DerivedMetrics,
}

impl StoreState {
    fn worker(&mut self, id: u32) -> &mut WorkerRecord {
        self.workers.entry(id).or_insert_with(|| WorkerRecord::new(id))
    }
}

impl MetricsStore {
    /// `target_total` is fixed for the run: workers × operations per worker.
    pub fn new(target_total: u64) -> Self {
        Self {
            state: Mutex::new(StoreState {
                workers: BTreeMap::new(),
                finished_ids: BTreeSet::new(),
                total_successful: 0,
                total_failed: 0,
                active_workers: 0,
                finished_workers: 0,
                proxies_available: 0,
                target_total,
                initial_counter: 0,
                started_at: Instant::now(),
                started_wall: Local::now(),
                derived: DerivedMetrics::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A panicking worker must not take the dashboard down with it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restamps the run start; elapsed-time metrics are measured from here.
    pub fn begin_run(&self) {
        let mut state = self.lock();
        state.started_at = Instant::now();
        state.started_wall = Local::now();
    }

    pub fn set_proxies_available(&self, count: u64) {
        self.lock().proxies_available = count;
    }

    /// Records the counter observed before the run. Also seeds the current value.
    pub fn set_initial_counter(&self, value: u64) {
        let mut state = self.lock();
        state.initial_counter = value;
        state.derived.current_counter = value;
    }

    pub fn record_success(&self, worker_id: u32) {
        let mut state = self.lock();
        state.worker(worker_id).successful += 1;
        state.total_successful += 1;
    }

    pub fn record_failure(&self, worker_id: u32, error: &str) {
        let mut state = self.lock();
        let worker = state.worker(worker_id);
        worker.failed += 1;
        worker.last_error = Some(error.to_string());
        state.total_failed += 1;
    }

    pub fn set_status(&self, worker_id: u32, status: WorkerStatus) {
        self.lock().worker(worker_id).status = status;
    }

    pub fn mark_active(&self, worker_id: u32) {
        let mut state = self.lock();
        state.worker(worker_id).status = WorkerStatus::Idle;
        state.active_workers += 1;
    }

    /// Moves a worker from active to finished. A worker that already
    /// reported `Stopped` keeps that label. Returns `false` on a repeat call.
    pub fn mark_finished(&self, worker_id: u32) -> bool {
        let mut state = self.lock();
        if !state.finished_ids.insert(worker_id) {
            log::warn!("Worker #{} marked finished twice", worker_id);
            return false;
        }

        let worker = state.worker(worker_id);
        if worker.status != WorkerStatus::Stopped {
            worker.status = WorkerStatus::Finished;
        }
        state.active_workers = state.active_workers.saturating_sub(1);
        state.finished_workers += 1;
        true
    }

    /// Recomputes derived metrics against the time elapsed since the run began.
    pub fn recompute_derived(&self, current_counter: u64) {
        let mut state = self.lock();
        let elapsed = state.started_at.elapsed();
        Self::recompute(&mut state, current_counter, elapsed);
    }

    /// Same as [`recompute_derived`](Self::recompute_derived) with an explicit elapsed time.
    pub fn recompute_derived_at(&self, current_counter: u64, elapsed: Duration) {
        let mut state = self.lock();
        Self::recompute(&mut state, current_counter, elapsed);
    }

    fn recompute(state: &mut StoreState, current_counter: u64, elapsed: Duration) {
        // Zero means the counter is unknown this tick.
        if current_counter == 0 {
            return;
        }

        let total = state.total_successful + state.total_failed;
        if total > 0 {
            state.derived.success_rate = state.total_successful as f64 / total as f64 * 100.0;
        }
        state.derived.current_counter = current_counter;

        if state.initial_counter > 0 {
            let gained = current_counter as i64 - state.initial_counter as i64;
            state.derived.counter_gained = gained;

            let secs = elapsed.as_secs_f64();
            if secs > 0.0 {
                state.derived.rate_per_second = gained as f64 / secs;
                state.derived.rate_per_minute = state.derived.rate_per_second * 60.0;
            }
        }

        let remaining = state.target_total.saturating_sub(state.total_successful);
        state.derived.eta = if state.derived.rate_per_second > 0.0 && remaining > 0 {
            Duration::try_from_secs_f64(remaining as f64 / state.derived.rate_per_second).ok()
        } else {
            None
        };
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.lock();
        MetricsSnapshot {
            total_successful: state.total_successful,
            total_failed: state.total_failed,
            active_workers: state.active_workers,
            finished_workers: state.finished_workers,
            proxies_available: state.proxies_available,
            target_total: state.target_total,
            initial_counter: state.initial_counter,
            started_at: state.started_wall,
            elapsed_seconds: state.started_at.elapsed().as_secs_f64(),
            derived: state.derived,
            workers: state.workers.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_failure_update_worker_and_totals() {
        let store = MetricsStore::new(10);
        store.record_success(1);
        store.record_success(1);
        store.record_failure(2, "HTTP 500");

        let snap = store.snapshot();
        assert_eq!(snap.total_successful, 2);
        assert_eq!(snap.total_failed, 1);
        assert_eq!(snap.worker(1).unwrap().successful, 2);
        assert_eq!(snap.worker(2).unwrap().last_error.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn last_error_is_overwritten_not_cleared() {
        let store = MetricsStore::new(10);
        store.record_failure(1, "timeout");
        store.record_success(1);
        assert_eq!(store.snapshot().worker(1).unwrap().last_error.as_deref(), Some("timeout"));

        store.record_failure(1, "HTTP 429");
        assert_eq!(store.snapshot().worker(1).unwrap().last_error.as_deref(), Some("HTTP 429"));
    }

    #[test]
    fn finish_keeps_stopped_label_and_counts_once() {
        let store = MetricsStore::new(4);
        store.mark_active(1);
        store.mark_active(2);
        store.set_status(1, WorkerStatus::Stopped);

        assert!(store.mark_finished(1));
        assert!(store.mark_finished(2));
        assert!(!store.mark_finished(2));

        let snap = store.snapshot();
        assert_eq!(snap.active_workers, 0);
        assert_eq!(snap.finished_workers, 2);
        assert_eq!(snap.worker(1).unwrap().status, WorkerStatus::Stopped);
        assert_eq!(snap.worker(2).unwrap().status, WorkerStatus::Finished);
    }

    #[test]
    fn unknown_counter_leaves_counter_metrics_untouched() {
        let store = MetricsStore::new(100);
        store.set_initial_counter(1_000);
        store.recompute_derived_at(1_060, Duration::from_secs(60));
        let before = store.snapshot().derived;

        store.recompute_derived_at(0, Duration::from_secs(120));
        assert_eq!(store.snapshot().derived, before);
    }

    #[test]
    fn rates_follow_elapsed_time() {
        let store = MetricsStore::new(100);
        store.set_initial_counter(1_000);
        for _ in 0..40 {
            store.record_success(1);
        }

        store.recompute_derived_at(1_060, Duration::from_secs(60));
        let derived = store.snapshot().derived;
        assert_eq!(derived.counter_gained, 60);
        assert!((derived.rate_per_second - 1.0).abs() < f64::EPSILON);
        assert!((derived.rate_per_minute - 60.0).abs() < f64::EPSILON);
        assert_eq!(derived.eta, Some(Duration::from_secs(60)));
        assert!((derived.success_rate - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unrepresentable_eta_is_dropped() {
        let store = MetricsStore::new(u64::MAX);
        store.set_initial_counter(1);
        store.recompute_derived_at(2, Duration::from_secs(u64::MAX / 2));

        let derived = store.snapshot().derived;
        assert!(derived.rate_per_second > 0.0);
        assert_eq!(derived.eta, None);
    }

    #[test]
    fn missing_initial_counter_disables_gain() {
        let store = MetricsStore::new(10);
        store.recompute_derived_at(500, Duration::from_secs(10));

        let derived = store.snapshot().derived;
        assert_eq!(derived.current_counter, 500);
        assert_eq!(derived.counter_gained, 0);
        assert_eq!(derived.rate_per_second, 0.0);
        assert_eq!(derived.eta, None);
    }
}
