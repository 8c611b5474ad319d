//! Two-sample comparison of measurement sequences.

use serde::Serialize;

use super::{mean, t_p_value, variance};

/// Which sequence of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Baseline,
    Candidate,
}

/// Outcome of comparing a baseline sequence against a candidate sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub p_value: f64,
    pub statistically_significant: bool,
    /// Percent change of the mean (positive = candidate is faster).
    pub effect_size: f64,
    pub confidence_level: f64,
    /// The faster side, if the difference is significant.
    pub winner: Option<Side>,
    pub baseline_mean: f64,
    pub candidate_mean: f64,
}

/// Compares two sets of measurements in milliseconds.
pub trait StatisticalTest: Send + Sync {
    fn analyze(&self, baseline: &[f64], candidate: &[f64]) -> ComparisonResult;
}

/// Welch's t-test: no equal-variance assumption between the two sequences.
#[derive(Debug, Clone)]
pub struct WelchTTest {
    pub confidence_level: f64,
}

impl Default for WelchTTest {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
        }
    }
}

impl WelchTTest {
    pub fn new(confidence_level: f64) -> Self {
        Self { confidence_level }
    }

    /// Welch-Satterthwaite degrees of freedom.
    fn degrees_of_freedom(var1: f64, n1: usize, var2: f64, n2: usize) -> f64 {
        let s1 = var1 / n1 as f64;
        let s2 = var2 / n2 as f64;
        let denominator = s1.powi(2) / (n1 - 1) as f64 + s2.powi(2) / (n2 - 1) as f64;
        if denominator == 0.0 {
            return (n1.min(n2) - 1) as f64;
        }
        (s1 + s2).powi(2) / denominator
    }

    fn percent_change(baseline_mean: f64, candidate_mean: f64) -> f64 {
        if baseline_mean == 0.0 {
            0.0
        } else {
            (baseline_mean - candidate_mean) / baseline_mean * 100.0
        }
    }

    fn faster(baseline_mean: f64, candidate_mean: f64) -> Option<Side> {
        if baseline_mean > candidate_mean {
            Some(Side::Candidate)
        } else if candidate_mean > baseline_mean {
            Some(Side::Baseline)
        } else {
            None
        }
    }
}

impl StatisticalTest for WelchTTest {
    fn analyze(&self, baseline: &[f64], candidate: &[f64]) -> ComparisonResult {
        let (n1, n2) = (baseline.len(), candidate.len());
        let baseline_mean = mean(baseline);
        let candidate_mean = mean(candidate);
        let effect_size = Self::percent_change(baseline_mean, candidate_mean);

        let mut result = ComparisonResult {
            p_value: 1.0,
            statistically_significant: false,
            effect_size,
            confidence_level: self.confidence_level,
            winner: None,
            baseline_mean,
            candidate_mean,
        };

        if n1 < 2 || n2 < 2 {
            result.effect_size = 0.0;
            return result;
        }

        let var1 = variance(baseline);
        let var2 = variance(candidate);
        let se = (var1 / n1 as f64 + var2 / n2 as f64).sqrt();

        result.p_value = if se == 0.0 {
            if baseline_mean == candidate_mean {
                1.0
            } else {
                0.0
            }
        } else {
            let t = (baseline_mean - candidate_mean) / se;
            t_p_value(t, Self::degrees_of_freedom(var1, n1, var2, n2))
        };

        result.statistically_significant = result.p_value < 1.0 - self.confidence_level;
        if result.statistically_significant {
            result.winner = Self::faster(baseline_mean, candidate_mean);
        }
        result
    }
}
