use super::format::{format_hms, format_number, format_signed, truncate};
use super::{PresentationSink, RenderFrame};
use crate::error::{Error, Result};
use async_trait::async_trait;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

const MAX_ERROR_LINES: usize = 3;
const ERROR_WIDTH: usize = 40;

/// Live terminal view. With a `MultiProgress` the dashboard redraws in
/// place; without one each refresh is a single log line.
pub struct ConsoleDashboard {
    multi: Option<Arc<MultiProgress>>,
    bar: Option<ProgressBar>,
    lines: Vec<ProgressBar>,
}

impl ConsoleDashboard {
    pub fn new(multi: Option<Arc<MultiProgress>>) -> Self {
        Self {
            multi,
            bar: None,
            lines: Vec::new(),
        }
    }

    fn ensure_bars(&mut self, multi: &MultiProgress, target_total: u64, line_count: usize) -> Result<()> {
        if self.bar.is_none() {
            let pb = multi.add(ProgressBar::new(target_total));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .map_err(|e| Error::Internal(e.to_string()))?
                    .progress_chars("#>-"),
            );
            pb.enable_steady_tick(Duration::from_millis(250));
            self.bar = Some(pb);
        }

        while self.lines.len() < line_count {
            let line = multi.add(ProgressBar::new_spinner());
            line.set_style(
                ProgressStyle::default_spinner()
                    .template("{msg}")
                    .map_err(|e| Error::Internal(e.to_string()))?,
            );
            self.lines.push(line);
        }
        Ok(())
    }
}

impl Default for ConsoleDashboard {
    fn default() -> Self {
        Self::new(None)
    }
}

/// The dashboard body below the progress bar.
pub fn dashboard_lines(frame: &RenderFrame) -> Vec<String> {
    let snap = &frame.snapshot;
    let derived = &snap.derived;
    let mut lines = Vec::new();

    let runtime = format_hms(Duration::from_secs_f64(snap.elapsed_seconds));
    match derived.eta {
        Some(eta) => lines.push(format!(
            "Target: {}   Runtime: {}   ETA: {}",
            frame.target_id,
            runtime,
            format_hms(eta)
        )),
        None => lines.push(format!("Target: {}   Runtime: {}", frame.target_id, runtime)),
    }

    if snap.counter_known() {
        lines.push(format!(
            "Counter: {} (initial {}, gained {}) | Rate: {:.1}/min ({:.2}/sec)",
            format_number(derived.current_counter),
            format_number(snap.initial_counter),
            format_signed(derived.counter_gained),
            derived.rate_per_minute,
            derived.rate_per_second
        ));
    } else {
        lines.push("Counter: unavailable".to_string());
    }

    lines.push(format!(
        "Workers: {} | Active: {} | Finished: {}",
        frame.workers, snap.active_workers, snap.finished_workers
    ));
    lines.push(format!(
        "Succeeded: {} | Failed: {} | Success rate: {:.1}%",
        format_number(snap.total_successful),
        format_number(snap.total_failed),
        derived.success_rate
    ));
    lines.push(format!(
        "Requests/sec: {:.2} | Total requests: {}",
        snap.requests_per_second(),
        format_number(snap.total_requests())
    ));

    if snap.proxies_available > 0 {
        lines.push(format!("Proxy: {} configured", snap.proxies_available));
    } else {
        lines.push("Proxy: none, direct connections".to_string());
    }

    let mut errors = snap.workers_with_errors().take(MAX_ERROR_LINES).peekable();
    if errors.peek().is_none() {
        lines.push("Recent errors: none, all workers healthy".to_string());
    } else {
        lines.push("Recent errors:".to_string());
        for worker in errors {
            lines.push(format!(
                "  Worker #{}: {} ({})",
                worker.id,
                worker.status,
                truncate(worker.last_error.as_deref().unwrap_or_default(), ERROR_WIDTH)
            ));
        }
    }

    lines
}

#[async_trait]
impl PresentationSink for ConsoleDashboard {
    async fn render(&mut self, frame: &RenderFrame) -> Result<()> {
        let snap = &frame.snapshot;
        let lines = dashboard_lines(frame);

        let Some(multi) = self.multi.clone() else {
            log::info!(
                "{}/{} operations | ok {} | failed {} | active {} | finished {}",
                snap.total_requests(),
                snap.target_total,
                snap.total_successful,
                snap.total_failed,
                snap.active_workers,
                snap.finished_workers
            );
            return Ok(());
        };

        self.ensure_bars(&multi, snap.target_total, lines.len().max(self.lines.len()))?;
        if let Some(pb) = &self.bar {
            pb.set_length(snap.target_total);
            pb.set_position(snap.total_requests());
            pb.set_message(format!("{:.1}% succeeded", snap.progress_percent()));
        }
        for (i, line) in self.lines.iter().enumerate() {
            line.set_message(lines.get(i).cloned().unwrap_or_default());
        }
        Ok(())
    }

    async fn close(&mut self, frame: &RenderFrame) -> Result<()> {
        self.render(frame).await?;
        let snap = &frame.snapshot;
        let all_done = snap.finished_workers >= u64::from(frame.workers);

        if let Some(pb) = self.bar.take() {
            pb.finish_with_message(if all_done { "All workers finished" } else { "Stopped" });
        }
        for line in self.lines.drain(..) {
            line.finish();
        }
        Ok(())
    }
}
