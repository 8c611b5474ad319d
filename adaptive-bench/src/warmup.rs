//! Warmup phase: invoke the source until its variation settles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use adaptive_bench_core::stats::coefficient_of_variation;
use adaptive_bench_core::{AdaptiveConfig, WarmupOutcome, WarmupResult};
use tracing::{debug, info, warn};

use crate::controller::{ControllerError, Phase};
use crate::failure::FailureTracker;
use crate::source::{measure_checked, MeasurementSource};

/// Runs the warmup phase. Warmup values are never part of the measured data.
pub struct WarmupController<'a> {
    config: &'a AdaptiveConfig,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> WarmupController<'a> {
    pub fn new(config: &'a AdaptiveConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn run<S: MeasurementSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> Result<WarmupResult, ControllerError> {
        let start = Instant::now();
        // A single value has no variation to judge.
        let window_size = self.config.stability_window_size().max(2);
        let mut window = VecDeque::with_capacity(window_size);
        let mut tracker =
            FailureTracker::new(self.config.failure_window(), self.config.max_failure_rate());
        let mut iterations = 0;
        info!(
            min_iterations = self.config.minimum_warmup_iterations(),
            max_iterations = self.config.maximum_warmup_iterations(),
            "warmup started"
        );

        let outcome = loop {
            if self.cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                break WarmupOutcome::Cancelled;
            }
            if iterations >= self.config.maximum_warmup_iterations() {
                break WarmupOutcome::MaxIterations;
            }
            if start.elapsed() >= self.config.warmup_timeout() {
                break WarmupOutcome::Timeout;
            }

            match measure_checked(source) {
                Ok(value) => {
                    tracker.record_success();
                    iterations += 1;
                    if window.len() == window_size {
                        window.pop_front();
                    }
                    window.push_back(value);
                }
                Err(err) => {
                    tracker.record_failure();
                    warn!(
                        phase = %Phase::Warmup,
                        failures = tracker.total_failures(),
                        error = %err,
                        "measurement failed"
                    );
                    if tracker.is_exceeded() {
                        return Err(ControllerError::TooManyFailures {
                            phase: Phase::Warmup,
                            failures: tracker.window_failures(),
                            window: tracker.window(),
                            last_error: err.to_string(),
                        });
                    }
                    continue;
                }
            }

            if iterations >= self.config.minimum_warmup_iterations() && window.len() >= 2 {
                let cv = rolling_cv(&window);
                debug!(iterations, cv, "warmup window");
                if cv < self.config.warmup_cv_threshold() {
                    break WarmupOutcome::Stabilized;
                }
            }
        };

        let final_cv = if window.len() >= 2 {
            rolling_cv(&window)
        } else {
            f64::INFINITY
        };
        let result = WarmupResult {
            completed: outcome == WarmupOutcome::Stabilized,
            outcome,
            iterations,
            failures: tracker.total_failures(),
            elapsed: start.elapsed(),
            final_cv,
        };

        if result.completed {
            info!(iterations, final_cv, "warmup stabilized");
        } else {
            warn!(?outcome, iterations, final_cv, "warmup ended without stabilizing");
        }
        Ok(result)
    }
}

fn rolling_cv(window: &VecDeque<f64>) -> f64 {
    let (front, back) = window.as_slices();
    if back.is_empty() {
        coefficient_of_variation(front)
    } else {
        let values: Vec<f64> = window.iter().copied().collect();
        coefficient_of_variation(&values)
    }
}
