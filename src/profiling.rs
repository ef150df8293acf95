use std::time::{Duration, Instant};
use tracing::debug;

/// A simple timer for measuring execution time of code blocks
#[derive(Debug)]
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    /// Create a new timer with a label
    #[must_use]
    pub fn new(label: &str) -> Self {
        debug!("Starting timer: {}", label);
        Self { label: label.to_string(), start: Instant::now() }
    }

    /// Stop the timer and log the elapsed time
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        debug!("Timer '{}' completed in {:?}", self.label, elapsed);
        elapsed
    }
}

/// Counters kept by the aggregation engine across recomputes
#[derive(Debug, Clone, Default)]
pub struct RecomputeMetrics {
    /// Recomputes that actually ran
    pub recomputes: u64,
    /// Change notifications folded into an already scheduled recompute
    pub coalesced_requests: u64,
    /// Recomputes whose result was superseded before it could be emitted
    pub superseded: u64,
    /// Change events emitted to subscribers
    pub emitted: u64,
    pub last_duration: Duration,
    pub total_duration: Duration,
}

impl RecomputeMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_recompute(&mut self, duration: Duration) {
        self.recomputes = self.recomputes.saturating_add(1);
        self.last_duration = duration;
        self.total_duration = self.total_duration.saturating_add(duration);
    }

    pub fn log_summary(&self) {
        debug!("=== Recompute Summary ===");
        debug!("Recomputes run: {}", self.recomputes);
        debug!("Requests coalesced: {}", self.coalesced_requests);
        debug!("Results superseded: {}", self.superseded);
        debug!("Change events emitted: {}", self.emitted);
        debug!("Last recompute took: {:?}", self.last_duration);

        if self.recomputes > 0 {
            let runs = u32::try_from(self.recomputes).unwrap_or(u32::MAX);
            let avg = self.total_duration.checked_div(runs).unwrap_or_default();
            debug!("Average recompute time: {:?}", avg);
        }
    }
}
