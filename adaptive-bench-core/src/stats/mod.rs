//! Statistical building blocks used by the stopping engine.
//!
//! All functions operate on measurements in milliseconds, in collection order.

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

mod confidence;
mod outliers;
mod significance;
mod stability;
mod summary;
mod welch;

pub use confidence::{ConfidenceEstimator, ConfidenceInterval, IntervalMethod};
pub use outliers::{
    OutlierAnalysis, OutlierDetector, OutlierEstimator, OutlierHandling, IQR_FENCE,
    MIN_OUTLIER_SAMPLES,
};
pub use significance::{SignificanceDetector, SignificanceResult, TARGET_POWER};
pub use stability::{StabilityAnalysis, StabilityAnalyzer, StabilityIssue, STABLE_SCORE};
pub use summary::SummaryStatistics;
pub use welch::{ComparisonResult, Side, StatisticalTest, WelchTTest};

/// Arithmetic mean; zero for an empty slice.
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Sample variance with Bessel's correction; zero below two samples.
pub fn variance(samples: &[f64]) -> f64 {
    if samples.len() < 2 || samples.iter().all(|x| *x == samples[0]) {
        return 0.0;
    }
    let m = mean(samples);
    let sum_sq: f64 = samples.iter().map(|x| (x - m).powi(2)).sum();
    sum_sq / (samples.len() - 1) as f64
}

pub fn std_dev(samples: &[f64]) -> f64 {
    variance(samples).sqrt()
}

/// Standard deviation over |mean|.
///
/// Zero spread yields 0 regardless of the mean; a zero mean with non-zero
/// spread yields infinity.
pub fn coefficient_of_variation(samples: &[f64]) -> f64 {
    let sd = std_dev(samples);
    if sd == 0.0 {
        return 0.0;
    }
    let m = mean(samples).abs();
    if m == 0.0 {
        f64::INFINITY
    } else {
        sd / m
    }
}

/// Copy of `samples` in ascending order.
pub fn sorted(samples: &[f64]) -> Vec<f64> {
    let mut values = samples.to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// Linear-interpolated percentile of an already sorted slice, `p` in [0, 100].
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let frac = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

pub fn median(samples: &[f64]) -> f64 {
    percentile_sorted(&sorted(samples), 50.0)
}

/// Least-squares slope of the values against their index.
pub fn linear_slope(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(samples);
    let (num, den) = samples
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Two-sided Student's t critical value for `confidence_level` with `df` degrees of freedom.
pub fn t_critical(confidence_level: f64, df: f64) -> f64 {
    let p = 1.0 - (1.0 - confidence_level) / 2.0;
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => dist.inverse_cdf(p),
        Err(_) => f64::INFINITY,
    }
}

/// Two-sided Student's t p-value for the statistic `t`.
pub fn t_p_value(t: f64, df: f64) -> f64 {
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Standard normal quantile.
pub fn z_quantile(p: f64) -> f64 {
    Normal::new(0.0, 1.0)
        .map(|dist| dist.inverse_cdf(p))
        .unwrap_or(f64::NAN)
}

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    Normal::new(0.0, 1.0)
        .map(|dist| dist.cdf(x))
        .unwrap_or(f64::NAN)
}
