use super::{PresentationSink, RenderFrame};
use crate::config::ReportConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Yaml,
}

#[derive(Serialize)]
struct Report<'a> {
    target_id: &'a str,
    workers: u32,
    #[serde(flatten)]
    snapshot: &'a crate::metrics::MetricsSnapshot,
}

/// Writes the final snapshot to disk when the run closes. Ticks are ignored.
pub struct ReportWriter {
    path: PathBuf,
    format: ReportFormat,
}

impl ReportWriter {
    pub fn new(path: PathBuf, format: ReportFormat) -> Self {
        Self { path, format }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        match config {
            ReportConfig::Json { path } => Self::new(PathBuf::from(path), ReportFormat::Json),
            ReportConfig::Yaml { path } => Self::new(PathBuf::from(path), ReportFormat::Yaml),
        }
    }

    fn open(&self) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?)
    }
}

#[async_trait]
impl PresentationSink for ReportWriter {
    async fn render(&mut self, _frame: &RenderFrame) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self, frame: &RenderFrame) -> Result<()> {
        let report = Report {
            target_id: &frame.target_id,
            workers: frame.workers,
            snapshot: &frame.snapshot,
        };

        let mut file = self.open()?;
        match self.format {
            ReportFormat::Json => {
                serde_json::to_writer_pretty(&mut file, &report)?;
                writeln!(file)?;
            }
            ReportFormat::Yaml => serde_yaml::to_writer(&mut file, &report)?,
        }
        log::info!("Report written to {}", self.path.display());
        Ok(())
    }
}
