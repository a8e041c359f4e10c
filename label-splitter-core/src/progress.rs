//! Progress tracking for the label extraction pipeline

use std::time::{Duration, Instant};

/// Progress information after a cell has been processed
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Number of cells processed so far, blank or not
    pub processed: usize,
    /// Total number of cells, fixed when the source is opened
    pub total: usize,
    /// Start time of the run
    pub start_time: Instant,
}

impl ProgressInfo {
    /// Completed fraction in [0, 1]; exactly 1.0 once every cell is done
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Estimated time remaining from the throughput so far
    pub fn calculate_eta(&self) -> Option<Duration> {
        let elapsed = self.elapsed().as_secs_f64();
        if self.processed == 0 || elapsed <= 0.0 {
            return None;
        }
        let per_cell = elapsed / self.processed as f64;
        let remaining = self.total.saturating_sub(self.processed);
        Some(Duration::from_secs_f64(per_cell * remaining as f64))
    }
}

/// Counts processed cells
#[derive(Debug)]
pub struct ProgressTracker {
    processed: usize,
    total: usize,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            processed: 0,
            total,
            start_time: Instant::now(),
        }
    }

    /// Mark one more cell as processed and return the new state
    pub fn advance(&mut self) -> ProgressInfo {
        self.processed = (self.processed + 1).min(self.total);
        self.info()
    }

    pub fn info(&self) -> ProgressInfo {
        ProgressInfo {
            processed: self.processed,
            total: self.total,
            start_time: self.start_time,
        }
    }
}

/// Receives progress fractions, in increasing order, on the pipeline's thread
pub trait ProgressSink {
    /// Called after every processed cell with `processed / total`
    fn on_progress(&mut self, fraction: f64);

    /// Called after every processed cell with the counts behind the fraction.
    /// Sinks that want counts or an ETA override this one.
    fn on_cell(&mut self, info: &ProgressInfo) {
        self.on_progress(info.fraction());
    }
}

/// Implementation of ProgressSink for closures
impl<F> ProgressSink for F
where
    F: FnMut(f64),
{
    fn on_progress(&mut self, fraction: f64) {
        self(fraction)
    }
}

/// A sink that drops every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _fraction: f64) {}
}

/// Progress bar renderer for terminal output
pub struct ProgressBar {
    width: usize,
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self::new(40)
    }
}

impl ProgressBar {
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    /// Render a bare fraction
    pub fn render_fraction(&self, fraction: f64) -> String {
        let fraction = fraction.clamp(0.0, 1.0);
        let filled = (fraction * self.width as f64) as usize;
        let empty = self.width.saturating_sub(filled);
        format!(
            "[{}{}] {:.1}%",
            "=".repeat(filled),
            " ".repeat(empty),
            fraction * 100.0
        )
    }

    /// Render the bar with counts and ETA
    pub fn render(&self, info: &ProgressInfo) -> String {
        let mut parts = vec![
            self.render_fraction(info.fraction()),
            format!("{}/{} labels", info.processed, info.total),
        ];
        if !info.is_complete() {
            parts.push(format!("ETA: {}", format_eta(info.calculate_eta())));
        }
        parts.join(" | ")
    }
}

fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(duration) => {
            let secs = duration.as_secs();
            if secs < 60 {
                format!("{secs}s")
            } else {
                format!("{}m {}s", secs / 60, secs % 60)
            }
        }
        None => "calculating...".to_string(),
    }
}
