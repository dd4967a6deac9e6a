pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod output;
pub mod poller;
pub mod supervisor;
pub mod worker;

pub use error::{Error, Result};
pub use executor::{HttpExecutor, OperationExecutor};
pub use metrics::snapshot::MetricsSnapshot;
pub use metrics::store::MetricsStore;
pub use poller::{PollOutcome, Poller};
pub use supervisor::{CancelSignal, RunState, RunSummary, Supervisor, SupervisorSettings};
pub use worker::{DelayPolicy, Worker, WorkerOutcome};
