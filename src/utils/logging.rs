use log::{Level, log_enabled, warn};
use std::time::{Duration, Instant};

/// Simple scoped timer for profiling the stages of a simulation step.
/// Elapsed time is added to `output` when provided, and traced when enabled.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
    output: Option<&'a mut Duration>,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: Instant::now(),
            output: None,
        }
    }

    /// Timer that also accumulates into a metrics slot.
    pub fn recording(label: &'a str, output: &'a mut Duration) -> Self {
        let mut timer = Self::new(label);
        timer.output = Some(output);
        timer
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if let Some(output) = self.output.as_deref_mut() {
            *output += elapsed;
        }
        if log_enabled!(Level::Trace) {
            log::trace!("end {} ({} µs)", self.label, elapsed.as_micros());
        }
    }
}

/// Registers a warning when the step budget is exceeded.
pub fn warn_if_frame_budget_exceeded(duration: Duration, budget_ms: f32) {
    if duration.as_secs_f32() * 1000.0 > budget_ms {
        warn!(
            "Step exceeded budget: {:.2} ms > {:.2} ms",
            duration.as_secs_f32() * 1000.0,
            budget_ms
        );
    }
}
