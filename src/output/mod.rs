use crate::error::Result;
use crate::metrics::MetricsSnapshot;
use async_trait::async_trait;

pub mod console;
pub mod format;
pub mod report;

pub use console::ConsoleDashboard;
pub use report::ReportWriter;

/// Everything a sink needs to draw one refresh of the run.
#[derive(Debug, Clone)]
pub struct RenderFrame {
    pub target_id: String,
    pub workers: u32,
    pub snapshot: MetricsSnapshot,
}

#[async_trait]
pub trait PresentationSink: Send + Sync {
    async fn render(&mut self, frame: &RenderFrame) -> Result<()>;
    async fn close(&mut self, _frame: &RenderFrame) -> Result<()> {
        Ok(())
    }
}
