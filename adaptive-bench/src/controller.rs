//! The adaptive measurement loop.
//!
//! A run warms the source up, then collects samples one invocation at a
//! time. Once the minimum sample count is reached the stopping engine is
//! consulted every `evaluation_interval` samples until it says stop or a hard
//! limit is hit.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use adaptive_bench_core::{
    AdaptiveConfig, BenchmarkReport, ConfigError, ConfigOptions, ControlState, Evaluation,
    StoppingDecision, StoppingEngine, SummaryStatistics, WarmupOutcome,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::failure::FailureTracker;
use crate::source::{measure_checked, MeasurementSource};
use crate::warmup::WarmupController;

/// Errors that end a run without a report.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The failure ceiling was reached over the trailing window.
    #[error("Measurement source failed {failures} of the last {window} invocations during {phase}. Last error: {last_error}")]
    TooManyFailures {
        phase: Phase,
        failures: usize,
        window: usize,
        last_error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Warmup,
    Sampling,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Warmup => f.write_str("warmup"),
            Phase::Sampling => f.write_str("sampling"),
        }
    }
}

/// Drives a [`MeasurementSource`] until the stopping engine is satisfied.
pub struct Controller {
    config: Arc<AdaptiveConfig>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Controller {
    pub fn new(config: Arc<AdaptiveConfig>) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Validate `options` and build a controller from them.
    pub fn from_options(options: ConfigOptions) -> Result<Self, ControllerError> {
        Ok(Self::new(Arc::new(AdaptiveConfig::new(options)?)))
    }

    /// Stop early with `USER_REQUESTED` once `flag` is set.
    ///
    /// The flag is checked once per loop iteration, so an invocation in
    /// progress always finishes first.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub fn run<S: MeasurementSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> Result<BenchmarkReport, ControllerError> {
        let id = Uuid::new_v4().to_string();
        let started_at = SystemTime::now();
        let start = Instant::now();
        let config = self.config.as_ref();

        info!(
            %id,
            confidence_level = config.confidence_level(),
            margin_of_error = config.margin_of_error(),
            min_samples = config.minimum_sample_size(),
            max_samples = config.maximum_sample_size(),
            "starting benchmark"
        );

        let mut warmup = WarmupController::new(config);
        if let Some(flag) = &self.cancel {
            warmup = warmup.with_cancellation(flag);
        }
        let warmup = warmup.run(source)?;

        let engine = StoppingEngine::new(config);
        let mut tracker = FailureTracker::new(config.failure_window(), config.max_failure_rate());
        let mut samples: Vec<f64> = Vec::with_capacity(config.maximum_sample_size().min(4_096));
        let mut state = ControlState::Collecting;
        let sampling_start = Instant::now();
        info!(warmup_iterations = warmup.iterations, "sampling started");

        let (evaluation, decision) = if warmup.outcome == WarmupOutcome::Cancelled {
            self.cancelled(&engine, &samples, sampling_start.elapsed())
        } else {
            loop {
                if self.is_cancelled() {
                    break self.cancelled(&engine, &samples, sampling_start.elapsed());
                }
                let elapsed = sampling_start.elapsed();
                if samples.len() >= config.maximum_sample_size()
                    || elapsed >= config.max_benchmark_duration()
                {
                    // The engine applies the hard limit itself.
                    break engine.evaluate(&samples, elapsed);
                }

                match measure_checked(source) {
                    Ok(value) => {
                        tracker.record_success();
                        samples.push(value);
                    }
                    Err(err) => {
                        tracker.record_failure();
                        warn!(
                            phase = %Phase::Sampling,
                            failures = tracker.total_failures(),
                            error = %err,
                            "measurement failed"
                        );
                        if tracker.is_exceeded() {
                            return Err(ControllerError::TooManyFailures {
                                phase: Phase::Sampling,
                                failures: tracker.window_failures(),
                                window: tracker.window(),
                                last_error: err.to_string(),
                            });
                        }
                        continue;
                    }
                }

                if !self.is_evaluation_point(samples.len()) {
                    continue;
                }

                transition(&mut state, ControlState::Evaluating);
                let (evaluation, decision) = engine.evaluate(&samples, sampling_start.elapsed());
                transition(&mut state, decision.state);
                if decision.should_stop {
                    break (evaluation, decision);
                }
            }
        };
        transition(&mut state, ControlState::Stop);

        let sampling_duration = sampling_start.elapsed();
        let summary = SummaryStatistics::from_samples(evaluation.cleaned_samples());
        let success = decision.is_successful();

        info!(
            %id,
            reason = ?decision.primary_reason,
            samples = samples.len(),
            cleaned = evaluation.outliers.cleaned_count(),
            mean = summary.mean,
            success,
            "benchmark finished"
        );

        Ok(BenchmarkReport {
            id,
            started_at,
            total_duration: start.elapsed(),
            sampling_duration,
            config: config.clone(),
            warmup,
            raw_count: samples.len(),
            cleaned_count: evaluation.outliers.cleaned_count(),
            failed_invocations: tracker.total_failures(),
            raw_samples: samples,
            outliers: evaluation.outliers,
            interval: evaluation.interval,
            robust_interval: evaluation.robust_interval,
            significance: evaluation.significance,
            stability: evaluation.stability,
            decision,
            summary,
            success,
        })
    }

    /// First evaluation at the minimum, then every `evaluation_interval` samples.
    fn is_evaluation_point(&self, n: usize) -> bool {
        let min = self.config.minimum_sample_size();
        n >= min && (n - min) % self.config.evaluation_interval() == 0
    }

    fn cancelled(
        &self,
        engine: &StoppingEngine,
        samples: &[f64],
        elapsed: Duration,
    ) -> (Evaluation, StoppingDecision) {
        info!(samples = samples.len(), "cancellation requested");
        let evaluation = engine.analyze(samples);
        let decision = engine.user_requested(samples.len(), elapsed, &evaluation);
        (evaluation, decision)
    }
}

fn transition(state: &mut ControlState, next: ControlState) {
    if *state != next {
        debug!(from = ?*state, to = ?next, "state transition");
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{from_fn, SourceError};
    use adaptive_bench_core::{Preset, StopReason};

    fn controller(options: ConfigOptions) -> Controller {
        Controller::new(Arc::new(AdaptiveConfig::new(options).unwrap()))
    }

    #[test]
    fn test_evaluation_points() {
        let controller = controller(ConfigOptions {
            evaluation_interval: 5,
            ..Preset::Quick.options()
        });
        let points: Vec<usize> = (0..40).filter(|&n| controller.is_evaluation_point(n)).collect();
        assert_eq!(points, vec![20, 25, 30, 35]);
    }

    #[test]
    fn test_constant_source_stops_at_minimum() {
        let controller = controller(Preset::Quick.options());
        let mut source = from_fn(|| Ok(10.0));

        let report = controller.run(&mut source).unwrap();

        assert!(report.success);
        assert_eq!(report.raw_count, 20);
        assert_eq!(report.reason(), Some(StopReason::ConfidenceAchieved));
        assert_eq!(report.summary.mean, 10.0);
        assert_eq!(report.summary.std_dev, 0.0);
        assert_eq!(report.failed_invocations, 0);
    }

    #[test]
    fn test_max_samples_reached() {
        let controller = controller(ConfigOptions {
            maximum_sample_size: 40,
            ..Preset::Quick.options()
        });
        let mut i = 0u32;
        let mut source = from_fn(|| {
            i += 1;
            Ok(if i % 2 == 0 { 1.0 } else { 1_000.0 })
        });

        let report = controller.run(&mut source).unwrap();

        assert!(!report.success);
        assert_eq!(report.raw_count, 40);
        assert_eq!(report.reason(), Some(StopReason::MaximumSamplesReached));
        assert!(report.decision.should_stop);
    }

    #[test]
    fn test_sampling_failures_abort() {
        let controller = controller(Preset::Quick.options());
        let mut calls = 0;
        let mut source = from_fn(|| {
            calls += 1;
            // Warmup succeeds on a constant, sampling always fails.
            if calls <= 5 {
                Ok(3.0)
            } else {
                Err(SourceError::Failed("lost connection".to_string()))
            }
        });

        let err = controller.run(&mut source).unwrap_err();
        match err {
            ControllerError::TooManyFailures { phase, ref last_error, .. } => {
                assert_eq!(phase, Phase::Sampling);
                assert_eq!(last_error, "Measurement failed: lost connection");
            }
            other => panic!("expected TooManyFailures, got {:?}", other),
        }
        assert!(err.to_string().contains("during sampling"));
    }

    #[test]
    fn test_cancellation_before_run() {
        let flag = Arc::new(AtomicBool::new(true));
        let controller = controller(Preset::Quick.options()).with_cancellation(flag);
        let mut source = from_fn(|| Ok(1.0));

        let report = controller.run(&mut source).unwrap();

        assert!(!report.success);
        assert_eq!(report.raw_count, 0);
        assert_eq!(report.warmup.outcome, WarmupOutcome::Cancelled);
        assert_eq!(report.reason(), Some(StopReason::UserRequested));
    }

    #[test]
    fn test_from_options_validates() {
        let result = Controller::from_options(ConfigOptions {
            confidence_level: 1.2,
            ..ConfigOptions::default()
        });
        match result {
            Err(ControllerError::Config(ConfigError::NotAFraction { name, .. })) => {
                assert_eq!(name, "confidence_level")
            }
            Err(other) => panic!("expected a config error, got {:?}", other),
            Ok(_) => panic!("invalid options accepted"),
        }

        let controller = Controller::from_options(Preset::Quick.options()).unwrap();
        assert_eq!(controller.config().minimum_sample_size(), 20);
    }

    #[test]
    fn test_error_display() {
        let err = ControllerError::TooManyFailures {
            phase: Phase::Warmup,
            failures: 20,
            window: 20,
            last_error: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Measurement source failed 20 of the last 20 invocations during warmup. Last error: boom"
        );
    }
}
