//! Stability and convergence of a measurement sequence over time.
//!
//! Stability looks at the most recent `window_size` samples: variation, linear
//! trend, a mean shift between two segments (change point) and a coarse
//! stationarity check between the first and last thirds. Convergence looks at
//! up to five trailing blocks of `convergence_window_size` samples and asks
//! whether successive block means stop moving while the CV inside the latest
//! block is within `cv_threshold` and no higher than the block before it.

use serde::Serialize;

use super::{coefficient_of_variation, linear_slope, mean, std_dev, variance};
use crate::config::AdaptiveConfig;

/// Score at or above which a window without change points counts as stable.
pub const STABLE_SCORE: f64 = 0.8;

/// Segment-mean t statistic above which a split is reported as a change point.
const CHANGE_POINT_T: f64 = 4.0;
const MIN_SEGMENT: usize = 2;
const MIN_CONVERGENCE_BLOCKS: usize = 3;
const MAX_CONVERGENCE_BLOCKS: usize = 5;
/// Highest convergence rate while the latest block's CV is above the threshold or rising.
const UNSETTLED_RATE_CAP: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityIssue {
    HighVariation,
    SignificantTrend,
    ChangePoint,
    NonStationary,
}

impl StabilityIssue {
    pub fn description(self) -> &'static str {
        match self {
            StabilityIssue::HighVariation => "high coefficient of variation",
            StabilityIssue::SignificantTrend => "significant trend detected",
            StabilityIssue::ChangePoint => "change point detected",
            StabilityIssue::NonStationary => "non-stationary behavior",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityAnalysis {
    pub is_stable: bool,
    /// In [0, 1]; zero while not evaluable.
    pub stability_score: f64,
    pub has_change_point: bool,
    /// Index into the analyzed sequence where the later segment starts.
    pub change_point_index: Option<usize>,
    /// In [0, 1]; zero while not evaluable.
    pub convergence_rate: f64,
    /// The latest block-to-block change is within the convergence threshold
    /// and the latest block's CV is settled.
    pub is_converging: bool,
    /// Every block-to-block change in the trailing blocks is within the
    /// threshold, every block's CV is within `cv_threshold` and the latest
    /// block's CV is no higher than the one before.
    pub has_converged: bool,
    pub coefficient_of_variation: f64,
    pub trend_slope: f64,
    pub trend_significance: f64,
    pub is_stationary: bool,
    pub issues: Vec<StabilityIssue>,
    /// At least `window_size` samples were available.
    pub evaluable: bool,
    /// At least three convergence blocks were available.
    pub convergence_evaluable: bool,
    pub window_size: usize,
}

impl StabilityAnalysis {
    fn not_evaluable(window_size: usize) -> Self {
        Self {
            is_stable: false,
            stability_score: 0.0,
            has_change_point: false,
            change_point_index: None,
            convergence_rate: 0.0,
            is_converging: false,
            has_converged: false,
            coefficient_of_variation: f64::INFINITY,
            trend_slope: 0.0,
            trend_significance: 0.0,
            is_stationary: false,
            issues: Vec::new(),
            evaluable: false,
            convergence_evaluable: false,
            window_size,
        }
    }

    pub fn reason(&self) -> String {
        if !self.evaluable {
            return "Insufficient data for analysis".to_string();
        }
        if self.issues.is_empty() {
            return "Measurements are stable".to_string();
        }
        let issues: Vec<&str> = self.issues.iter().map(|i| i.description()).collect();
        format!("Issues: {}", issues.join(", "))
    }
}

#[derive(Debug, Clone)]
struct Convergence {
    evaluable: bool,
    rate: f64,
    is_converging: bool,
    has_converged: bool,
}

/// Scores the trailing window of a sequence and checks block convergence.
#[derive(Debug, Clone)]
pub struct StabilityAnalyzer {
    /// Number of most recent samples the stability checks look at.
    pub window_size: usize,
    /// CV scale for the variation score and the high-variation check. Also
    /// the ceiling on per-block CV for convergence.
    pub cv_threshold: f64,
    /// Samples per convergence block.
    pub convergence_window_size: usize,
    /// Largest relative change between successive block means that counts as converged.
    pub convergence_threshold: f64,
    /// Floor for [`Self::estimate_additional_measurements`].
    pub minimum_sample_size: usize,
    /// Ceiling for [`Self::estimate_additional_measurements`].
    pub maximum_sample_size: usize,
}

impl StabilityAnalyzer {
    /// Analyzer using the stability and convergence settings of `config`.
    pub fn from_config(config: &AdaptiveConfig) -> Self {
        Self {
            window_size: config.stability_window_size(),
            cv_threshold: config.stability_cv_threshold(),
            convergence_window_size: config.convergence_window_size(),
            convergence_threshold: config.convergence_threshold(),
            minimum_sample_size: config.minimum_sample_size(),
            maximum_sample_size: config.maximum_sample_size(),
        }
    }

    pub fn analyze(&self, samples: &[f64]) -> StabilityAnalysis {
        if self.window_size == 0 || samples.len() < self.window_size {
            return StabilityAnalysis::not_evaluable(self.window_size);
        }

        let offset = samples.len() - self.window_size;
        let window = &samples[offset..];

        let window_mean = mean(window);
        let cv = coefficient_of_variation(window);
        let slope = linear_slope(window);
        let trend_significance = trend_significance(window, slope);
        let change_point_index = self.detect_change_point(window).map(|k| offset + k);
        let has_change_point = change_point_index.is_some();
        let is_stationary = is_stationary(window);

        let mut score = (-cv / self.cv_threshold).exp() * (-trend_significance / 2.0).exp();
        if has_change_point {
            score *= 0.5;
        }
        if !is_stationary {
            score *= 0.7;
        }
        let stability_score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut issues = Vec::new();
        if cv > self.cv_threshold {
            issues.push(StabilityIssue::HighVariation);
        }
        if slope != 0.0 && slope.abs() >= 0.01 * window_mean.abs() {
            issues.push(StabilityIssue::SignificantTrend);
        }
        if has_change_point {
            issues.push(StabilityIssue::ChangePoint);
        }
        if !is_stationary {
            issues.push(StabilityIssue::NonStationary);
        }

        let convergence = self.convergence(samples);

        StabilityAnalysis {
            is_stable: stability_score >= STABLE_SCORE && !has_change_point,
            stability_score,
            has_change_point,
            change_point_index,
            convergence_rate: convergence.rate,
            is_converging: convergence.is_converging,
            has_converged: convergence.has_converged,
            coefficient_of_variation: cv,
            trend_slope: slope,
            trend_significance,
            is_stationary,
            issues,
            evaluable: true,
            convergence_evaluable: convergence.evaluable,
            window_size: self.window_size,
        }
    }

    /// How many more samples the current variation suggests before the window settles.
    pub fn estimate_additional_measurements(
        &self,
        samples: &[f64],
        analysis: &StabilityAnalysis,
    ) -> usize {
        let n = samples.len();
        let remaining = self.maximum_sample_size.saturating_sub(n);
        if n == 0 {
            return self.minimum_sample_size.min(remaining);
        }
        if analysis.is_stable {
            return 0;
        }
        if !analysis.evaluable {
            return self.window_size.saturating_sub(n).min(remaining);
        }

        let cv = analysis.coefficient_of_variation;
        if cv <= self.cv_threshold {
            return self
                .minimum_sample_size
                .saturating_sub(n)
                .max(10)
                .min(remaining);
        }

        // CV of the mean shrinks with sqrt(n).
        let ratio = cv / self.cv_threshold;
        let total = n as f64 * ratio * ratio;
        if !total.is_finite() {
            return remaining;
        }
        (total.ceil() as usize).saturating_sub(n).min(remaining)
    }

    fn detect_change_point(&self, window: &[f64]) -> Option<usize> {
        let n = window.len();
        if n < 3 * MIN_SEGMENT {
            return None;
        }
        let overall = mean(window).abs();

        let mut best: Option<(usize, f64)> = None;
        for k in MIN_SEGMENT..=(n - MIN_SEGMENT) {
            let (before, after) = window.split_at(k);
            let shift = (mean(after) - mean(before)).abs();
            if shift == 0.0 {
                continue;
            }
            let pooled = ((before.len() - 1) as f64 * variance(before)
                + (after.len() - 1) as f64 * variance(after))
                / (n - 2) as f64;
            let se = (pooled * (1.0 / before.len() as f64 + 1.0 / after.len() as f64)).sqrt();
            let t = if se == 0.0 { f64::INFINITY } else { shift / se };

            let relative_shift = if overall == 0.0 {
                f64::INFINITY
            } else {
                shift / overall
            };
            if t > CHANGE_POINT_T
                && relative_shift >= self.cv_threshold
                && best.map_or(true, |(_, best_t)| t > best_t)
            {
                best = Some((k, t));
            }
        }
        best.map(|(k, _)| k)
    }

    fn convergence(&self, samples: &[f64]) -> Convergence {
        let size = self.convergence_window_size;
        let blocks = if size == 0 {
            0
        } else {
            (samples.len() / size).min(MAX_CONVERGENCE_BLOCKS)
        };
        if blocks < MIN_CONVERGENCE_BLOCKS {
            return Convergence {
                evaluable: false,
                rate: 0.0,
                is_converging: false,
                has_converged: false,
            };
        }

        let tail = &samples[samples.len() - blocks * size..];
        let means: Vec<f64> = tail.chunks(size).map(mean).collect();
        let cvs: Vec<f64> = tail.chunks(size).map(coefficient_of_variation).collect();
        let deltas: Vec<f64> = means
            .windows(2)
            .map(|pair| relative_change(pair[0], pair[1]))
            .collect();

        // Block means can agree while the samples inside each block swing
        // widely, so the spread of the latest block has to be settled too.
        let last_cv = cvs[blocks - 1];
        let spread_settled = last_cv <= self.cv_threshold && last_cv <= cvs[blocks - 2];

        let last = deltas.last().copied().unwrap_or(0.0);
        let closeness = if last == 0.0 {
            1.0
        } else {
            (self.convergence_threshold / last).min(1.0)
        };
        let shrinking = deltas.windows(2).filter(|pair| pair[1] <= pair[0]).count() as f64
            / (deltas.len() - 1) as f64;
        let rate = (0.5 * closeness + 0.5 * shrinking).clamp(0.0, 1.0);

        Convergence {
            evaluable: true,
            rate: if spread_settled {
                rate
            } else {
                rate.min(UNSETTLED_RATE_CAP)
            },
            is_converging: spread_settled && last <= self.convergence_threshold,
            has_converged: spread_settled
                && deltas.iter().all(|d| *d <= self.convergence_threshold)
                && cvs.iter().all(|cv| *cv <= self.cv_threshold),
        }
    }
}

/// `|slope|` in units of the standard error of the window mean.
fn trend_significance(window: &[f64], slope: f64) -> f64 {
    if window.len() < 3 {
        return 0.0;
    }
    let standard_error = std_dev(window) / (window.len() as f64).sqrt();
    if standard_error == 0.0 {
        0.0
    } else {
        (slope / standard_error).abs()
    }
}

/// First and last thirds agree on mean (within 20%) and variance (within 50%).
fn is_stationary(window: &[f64]) -> bool {
    if window.len() < 10 {
        return true;
    }
    let segment = window.len() / 3;
    let first = &window[..segment];
    let last = &window[window.len() - segment..];

    let overall_mean = mean(window).abs();
    let overall_var = variance(window);

    let mean_ok =
        overall_mean == 0.0 || (mean(first) - mean(last)).abs() / overall_mean < 0.2;
    let var_ok =
        overall_var == 0.0 || (variance(first) - variance(last)).abs() / overall_var < 0.5;
    mean_ok && var_ok
}

fn relative_change(previous: f64, current: f64) -> f64 {
    let diff = (current - previous).abs();
    if diff == 0.0 {
        0.0
    } else if current == 0.0 {
        f64::INFINITY
    } else {
        diff / current.abs()
    }
}
