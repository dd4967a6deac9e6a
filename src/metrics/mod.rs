pub mod snapshot;
pub mod store;

pub use snapshot::{DerivedMetrics, MetricsSnapshot, WorkerRecord, WorkerStatus};
pub use store::MetricsStore;
