use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Where a worker currently is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Operation { current: u32, total: u32 },
    Stopped,
    Finished,
}

impl WorkerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerStatus::Stopped | WorkerStatus::Finished)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "idle"),
            WorkerStatus::Operation { current, total } => write!(f, "operation {}/{}", current, total),
            WorkerStatus::Stopped => write!(f, "stopped"),
            WorkerStatus::Finished => write!(f, "finished"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: u32,
    pub successful: u64,
    pub failed: u64,
    pub status: WorkerStatus,
    /// Overwritten by each failure, never cleared.
    pub last_error: Option<String>,
}

impl WorkerRecord {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            successful: 0,
            failed: 0,
            status: WorkerStatus::Idle,
            last_error: None,
        }
    }
}

/// Values computed from the raw counters and elapsed time on every poll tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub current_counter: u64,
    pub counter_gained: i64,
    pub rate_per_second: f64,
    pub rate_per_minute: f64,
    pub success_rate: f64,
    pub eta: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_successful: u64,
    pub total_failed: u64,
    pub active_workers: u64,
    pub finished_workers: u64,
    pub proxies_available: u64,
    pub target_total: u64,
    pub initial_counter: u64,
    pub started_at: DateTime<Local>,
    pub elapsed_seconds: f64,
    pub derived: DerivedMetrics,
    pub workers: Vec<WorkerRecord>,
}

impl MetricsSnapshot {
    pub fn total_requests(&self) -> u64 {
        self.total_successful + self.total_failed
    }

    pub fn requests_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.total_requests() as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Share of the target total that succeeded, clamped to 0..=100.
    pub fn progress_percent(&self) -> f64 {
        if self.target_total == 0 {
            return 0.0;
        }
        (self.total_successful as f64 / self.target_total as f64 * 100.0).min(100.0)
    }

    pub fn counter_known(&self) -> bool {
        self.derived.current_counter > 0
    }

    pub fn worker(&self, id: u32) -> Option<&WorkerRecord> {
        self.workers.iter().find(|w| w.id == id)
    }

    /// Workers that have reported at least one failure, lowest id first.
    pub fn workers_with_errors(&self) -> impl Iterator<Item = &WorkerRecord> {
        self.workers.iter().filter(|w| w.last_error.is_some())
    }
}
