//! The stopping decision engine.
//!
//! [`StoppingEngine::analyze`] runs outlier cleaning and the three analyzers
//! over a raw measurement sequence; [`StoppingEngine::decide`] folds the
//! resulting [`Evaluation`] and the hard limits into a [`StoppingDecision`].
//! Both are pure: the same sequence, elapsed time and configuration always
//! produce the same decision.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AdaptiveConfig;
use crate::stats::{
    ConfidenceEstimator, ConfidenceInterval, OutlierAnalysis, OutlierDetector,
    SignificanceDetector, SignificanceResult, StabilityAnalysis, StabilityAnalyzer,
};

/// Average of confidence and stability quality needed for `MinimumSamplesReached`.
const QUALITY_THRESHOLD: f64 = 0.7;
/// Quality at which a single satisfied criterion is enough to stop.
const HIGH_QUALITY: f64 = 0.9;
/// Progress below which a long run is considered stuck.
const PROGRESS_FLOOR: f64 = 0.1;
/// Safety factor applied to the remaining-time estimate.
const TIME_BUFFER: f64 = 1.2;

/// Why a run stopped (or may stop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopReason {
    ConfidenceAchieved,
    StatisticalSignificance,
    MeasurementStability,
    ConvergenceDetected,
    MinimumSamplesReached,
    InsufficientProgress,
    MaximumSamplesReached,
    TimeLimitReached,
    UserRequested,
}

impl StopReason {
    /// Statistical reasons in primary-reason priority order.
    pub const PRIORITY: [StopReason; 6] = [
        StopReason::ConfidenceAchieved,
        StopReason::StatisticalSignificance,
        StopReason::MeasurementStability,
        StopReason::ConvergenceDetected,
        StopReason::MinimumSamplesReached,
        StopReason::InsufficientProgress,
    ];

    pub fn description(self) -> &'static str {
        match self {
            StopReason::ConfidenceAchieved => "Desired confidence interval width achieved",
            StopReason::StatisticalSignificance => "Statistical significance detected",
            StopReason::MeasurementStability => "Measurements have stabilized",
            StopReason::ConvergenceDetected => "Measurements have converged to stable value",
            StopReason::MinimumSamplesReached => {
                "Minimum sample size reached with acceptable quality"
            }
            StopReason::InsufficientProgress => "Insufficient improvement in recent measurements",
            StopReason::MaximumSamplesReached => "Maximum sample size limit reached",
            StopReason::TimeLimitReached => "Maximum benchmark duration exceeded",
            StopReason::UserRequested => "Benchmark stopped by user request",
        }
    }

    /// Terminations imposed from outside the statistics.
    pub fn is_forced(self) -> bool {
        matches!(
            self,
            StopReason::MaximumSamplesReached
                | StopReason::TimeLimitReached
                | StopReason::UserRequested
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Phase of the control loop with respect to stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    /// Below the minimum sample size; criteria are not evaluated.
    Collecting,
    /// Analyses are running on the current sequence.
    Evaluating,
    Continue,
    Stop,
}

/// Everything the analyzers report for one sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub outliers: OutlierAnalysis,
    /// Mean interval over the cleaned sequence; the stopping rule reads this one.
    pub interval: ConfidenceInterval,
    /// Median interval over the raw sequence, reported alongside.
    pub robust_interval: ConfidenceInterval,
    pub significance: SignificanceResult,
    pub stability: StabilityAnalysis,
}

impl Evaluation {
    pub fn cleaned_samples(&self) -> &[f64] {
        &self.outliers.cleaned_samples
    }
}

/// Snapshot of the inputs a decision was made from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionMetrics {
    pub sample_count: usize,
    pub cleaned_count: usize,
    pub elapsed: Duration,
    pub mean: f64,
    pub relative_width: f64,
    pub margin_of_error: f64,
    pub p_value: f64,
    pub effect_size: f64,
    pub power: f64,
    pub stability_score: f64,
    pub convergence_rate: f64,
    pub outlier_rate: f64,
    pub confidence_sufficient: bool,
    pub significant: bool,
    pub stable: bool,
    pub converged: bool,
    pub quality_sufficient: bool,
    pub insufficient_progress: bool,
}

/// Outcome of one stopping evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoppingDecision {
    /// The controller should collect no further samples.
    pub should_stop: bool,
    /// [`ControlState::Collecting`] below the minimum, otherwise `Continue` or `Stop`.
    pub state: ControlState,
    /// Highest-priority satisfied criterion, or the forced reason. `None` while continuing
    /// without any satisfied criterion.
    pub primary_reason: Option<StopReason>,
    /// Forced reason (if any) followed by every satisfied criterion in priority order.
    pub contributing_reasons: Vec<StopReason>,
    /// `1 - relative_width / margin_of_error`, clamped to [0, 1].
    pub confidence_score: f64,
    /// Stability score of the cleaned sequence, in [0, 1].
    pub stability_score: f64,
    /// Convergence rate of the cleaned sequence, in [0, 1].
    pub progress_score: f64,
    /// Further samples suggested before the next decision; zero once stopping.
    pub recommended_additional_samples: usize,
    /// Time the recommended samples should take at the observed rate, with a safety margin.
    pub estimated_remaining: Duration,
    /// Human-readable summary of the decision and its scores.
    pub explanation: String,
    /// Inputs the decision was made from.
    pub metrics: DecisionMetrics,
}

impl StoppingDecision {
    /// Stopped for a statistical reason rather than a limit or a cancellation.
    pub fn is_successful(&self) -> bool {
        self.should_stop && self.primary_reason.is_some_and(|r| !r.is_forced())
    }
}

struct Criteria {
    confidence: bool,
    significance: bool,
    stability: bool,
    convergence: bool,
    quality: bool,
    insufficient_progress: bool,
}

impl Criteria {
    fn satisfied(&self) -> Vec<StopReason> {
        StopReason::PRIORITY
            .into_iter()
            .filter(|reason| match reason {
                StopReason::ConfidenceAchieved => self.confidence,
                StopReason::StatisticalSignificance => self.significance,
                StopReason::MeasurementStability => self.stability,
                StopReason::ConvergenceDetected => self.convergence,
                StopReason::MinimumSamplesReached => self.quality,
                StopReason::InsufficientProgress => self.insufficient_progress,
                _ => false,
            })
            .collect()
    }
}

struct Scores {
    confidence: f64,
    stability: f64,
    progress: f64,
}

impl Scores {
    fn describe(&self) -> String {
        format!(
            "Quality scores - Confidence: {:.1}%, Stability: {:.1}%, Progress: {:.1}%",
            self.confidence * 100.0,
            self.stability * 100.0,
            self.progress * 100.0
        )
    }
}

/// Combines hard limits and the analyzers into stop/continue decisions.
#[derive(Debug, Clone)]
pub struct StoppingEngine {
    config: AdaptiveConfig,
    detector: OutlierDetector,
    estimator: ConfidenceEstimator,
    significance: SignificanceDetector,
    stability: StabilityAnalyzer,
}

impl StoppingEngine {
    pub fn new(config: &AdaptiveConfig) -> Self {
        Self {
            config: config.clone(),
            detector: OutlierDetector::new(config.outlier_estimator(), config.outlier_threshold())
                .with_handling(config.outlier_handling()),
            estimator: ConfidenceEstimator::new(config.confidence_level()),
            significance: SignificanceDetector::new(
                config.alpha(),
                config.minimum_effect(),
                config.significance_reference(),
            ),
            stability: StabilityAnalyzer::from_config(config),
        }
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Clean `raw` and run the three analyzers on the cleaned sequence.
    pub fn analyze(&self, raw: &[f64]) -> Evaluation {
        let outliers = self.detector.detect(raw);
        let cleaned = &outliers.cleaned_samples;
        let interval = self.estimator.estimate(cleaned);
        let robust_interval = self.estimator.estimate_robust(raw);
        let significance = self.significance.test(cleaned);
        let stability = self.stability.analyze(cleaned);
        Evaluation {
            outliers,
            interval,
            robust_interval,
            significance,
            stability,
        }
    }

    /// `analyze` followed by `decide`.
    pub fn evaluate(&self, raw: &[f64], elapsed: Duration) -> (Evaluation, StoppingDecision) {
        let evaluation = self.analyze(raw);
        let decision = self.decide(raw.len(), elapsed, &evaluation);
        (evaluation, decision)
    }

    /// Decide for a sequence of `sample_count` raw samples collected over `elapsed`.
    pub fn decide(
        &self,
        sample_count: usize,
        elapsed: Duration,
        evaluation: &Evaluation,
    ) -> StoppingDecision {
        let scores = self.scores(evaluation);
        let minimum = self.config.minimum_sample_size();
        let criteria = self.criteria(sample_count, evaluation, &scores);
        let metrics = self.metrics(sample_count, elapsed, evaluation, &criteria);

        let decision = if let Some(limit) = self.hard_limit(sample_count, elapsed) {
            self.forced(limit, criteria.satisfied(), scores, metrics)
        } else if sample_count < minimum {
            let additional = (minimum - sample_count)
                .min(self.config.maximum_sample_size().saturating_sub(sample_count));
            StoppingDecision {
                should_stop: false,
                state: ControlState::Collecting,
                primary_reason: None,
                contributing_reasons: Vec::new(),
                confidence_score: scores.confidence,
                stability_score: scores.stability,
                progress_score: scores.progress,
                recommended_additional_samples: additional,
                estimated_remaining: remaining_time(sample_count, elapsed, additional),
                explanation: format!(
                    "Collecting samples: {} of {} required before evaluation. {}",
                    sample_count,
                    minimum,
                    scores.describe()
                ),
                metrics,
            }
        } else {
            let satisfied = criteria.satisfied();
            let high_quality =
                scores.confidence >= HIGH_QUALITY || scores.stability >= HIGH_QUALITY;
            let should_stop = satisfied.len() >= 2
                || (high_quality && !satisfied.is_empty())
                || criteria.insufficient_progress;

            let (additional, remaining) = if should_stop {
                (0, Duration::ZERO)
            } else {
                let additional = self.additional_samples(sample_count, evaluation);
                (additional, remaining_time(sample_count, elapsed, additional))
            };

            let explanation = if should_stop {
                format!(
                    "Benchmark stopping recommended. Satisfied criteria: {}. {}",
                    join_descriptions(&satisfied),
                    scores.describe()
                )
            } else {
                format!(
                    "Benchmark should continue. Estimated {} additional samples needed. {}",
                    additional,
                    scores.describe()
                )
            };

            StoppingDecision {
                should_stop,
                state: if should_stop {
                    ControlState::Stop
                } else {
                    ControlState::Continue
                },
                primary_reason: satisfied.first().copied(),
                contributing_reasons: satisfied,
                confidence_score: scores.confidence,
                stability_score: scores.stability,
                progress_score: scores.progress,
                recommended_additional_samples: additional,
                estimated_remaining: remaining,
                explanation,
                metrics,
            }
        };

        debug!(
            samples = sample_count,
            cleaned = decision.metrics.cleaned_count,
            state = ?decision.state,
            reason = ?decision.primary_reason,
            confidence = decision.confidence_score,
            stability = decision.stability_score,
            progress = decision.progress_score,
            "stopping evaluation"
        );

        decision
    }

    /// Decision for a run cancelled from outside.
    pub fn user_requested(
        &self,
        sample_count: usize,
        elapsed: Duration,
        evaluation: &Evaluation,
    ) -> StoppingDecision {
        let scores = self.scores(evaluation);
        let criteria = self.criteria(sample_count, evaluation, &scores);
        let metrics = self.metrics(sample_count, elapsed, evaluation, &criteria);
        self.forced(StopReason::UserRequested, criteria.satisfied(), scores, metrics)
    }

    fn hard_limit(&self, sample_count: usize, elapsed: Duration) -> Option<StopReason> {
        if sample_count >= self.config.maximum_sample_size() {
            Some(StopReason::MaximumSamplesReached)
        } else if elapsed >= self.config.max_benchmark_duration() {
            Some(StopReason::TimeLimitReached)
        } else {
            None
        }
    }

    fn forced(
        &self,
        reason: StopReason,
        satisfied: Vec<StopReason>,
        scores: Scores,
        metrics: DecisionMetrics,
    ) -> StoppingDecision {
        let mut explanation = format!("Benchmark stopped: {}. ", reason.description());
        if !satisfied.is_empty() {
            explanation.push_str(&format!(
                "Satisfied criteria: {}. ",
                join_descriptions(&satisfied)
            ));
        }
        explanation.push_str(&scores.describe());

        let mut contributing_reasons = Vec::with_capacity(satisfied.len() + 1);
        contributing_reasons.push(reason);
        contributing_reasons.extend(satisfied);

        StoppingDecision {
            should_stop: true,
            state: ControlState::Stop,
            primary_reason: Some(reason),
            contributing_reasons,
            confidence_score: scores.confidence,
            stability_score: scores.stability,
            progress_score: scores.progress,
            recommended_additional_samples: 0,
            estimated_remaining: Duration::ZERO,
            explanation,
            metrics,
        }
    }

    fn scores(&self, evaluation: &Evaluation) -> Scores {
        let interval = &evaluation.interval;
        let confidence = if interval.insufficient_data {
            0.0
        } else {
            (1.0 - interval.relative_width / self.config.margin_of_error()).clamp(0.0, 1.0)
        };
        Scores {
            confidence,
            stability: evaluation.stability.stability_score,
            progress: evaluation.stability.convergence_rate,
        }
    }

    fn criteria(&self, sample_count: usize, evaluation: &Evaluation, scores: &Scores) -> Criteria {
        let minimum = self.config.minimum_sample_size();
        let eligible = sample_count >= minimum;
        let stability = &evaluation.stability;
        Criteria {
            confidence: eligible
                && evaluation
                    .interval
                    .is_sufficient(self.config.margin_of_error()),
            significance: eligible && evaluation.significance.is_significant,
            stability: eligible && stability.is_stable,
            convergence: eligible && stability.has_converged,
            quality: eligible
                && (scores.confidence + scores.stability) / 2.0 >= QUALITY_THRESHOLD,
            insufficient_progress: stability.convergence_evaluable
                && scores.progress < PROGRESS_FLOOR
                && sample_count > 2 * minimum,
        }
    }

    fn metrics(
        &self,
        sample_count: usize,
        elapsed: Duration,
        evaluation: &Evaluation,
        criteria: &Criteria,
    ) -> DecisionMetrics {
        DecisionMetrics {
            sample_count,
            cleaned_count: evaluation.outliers.cleaned_count(),
            elapsed,
            mean: evaluation.interval.center,
            relative_width: evaluation.interval.relative_width,
            margin_of_error: self.config.margin_of_error(),
            p_value: evaluation.significance.p_value,
            effect_size: evaluation.significance.effect_size,
            power: evaluation.significance.power,
            stability_score: evaluation.stability.stability_score,
            convergence_rate: evaluation.stability.convergence_rate,
            outlier_rate: evaluation.outliers.outlier_rate,
            confidence_sufficient: criteria.confidence,
            significant: criteria.significance,
            stable: criteria.stability,
            converged: criteria.convergence,
            quality_sufficient: criteria.quality,
            insufficient_progress: criteria.insufficient_progress,
        }
    }

    /// Larger of the interval-width and stability estimates, never zero, capped at the
    /// remaining sample budget.
    fn additional_samples(&self, sample_count: usize, evaluation: &Evaluation) -> usize {
        let cleaned = evaluation.cleaned_samples();
        let remaining = self
            .config
            .maximum_sample_size()
            .saturating_sub(sample_count);

        let from_interval = self
            .estimator
            .required_sample_size(cleaned, self.config.margin_of_error())
            .map(|n| n.saturating_sub(cleaned.len()))
            .unwrap_or(remaining);
        let from_stability = self
            .stability
            .estimate_additional_measurements(cleaned, &evaluation.stability);

        let estimate = from_interval.max(from_stability);
        let estimate = if estimate == 0 {
            self.config.evaluation_interval()
        } else {
            estimate
        };
        estimate.min(remaining)
    }
}

fn remaining_time(sample_count: usize, elapsed: Duration, additional: usize) -> Duration {
    if sample_count == 0 || additional == 0 {
        return Duration::ZERO;
    }
    let per_sample = elapsed.as_secs_f64() / sample_count as f64;
    Duration::try_from_secs_f64(per_sample * additional as f64 * TIME_BUFFER)
        .unwrap_or(Duration::MAX)
}

fn join_descriptions(reasons: &[StopReason]) -> String {
    reasons
        .iter()
        .map(|r| r.description())
        .collect::<Vec<_>>()
        .join("; ")
}
