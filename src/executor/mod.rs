use crate::error::Result;
use async_trait::async_trait;

pub mod http;

pub use http::HttpExecutor;

/// Performs network operations against the target on behalf of workers and
/// the poller. Implementations are shared across all workers and must be
/// safe for concurrent use.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// One action against the target. Any transport error or non-2xx
    /// outcome is an `Err`.
    async fn perform_action(&self, target: &str) -> Result<()>;

    /// Reads the target's external counter. Retries, if any, happen here.
    async fn read_counter(&self, target_id: &str) -> Result<u64>;

    fn proxies_available(&self) -> usize {
        0
    }
}
