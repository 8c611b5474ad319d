use serde::Serialize;

use super::{mean, median, std_dev, t_critical, z_quantile};

/// Normal-consistency factor for the median absolute deviation.
const MAD_SIGMA: f64 = 1.4826;
/// Standard error of the median relative to that of the mean for normal data.
const MEDIAN_EFFICIENCY: f64 = 1.2533;

/// Which location an interval brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMethod {
    /// Student's t around the sample mean.
    Mean,
    /// Student's t around the median, scaled from the MAD.
    Median,
}

/// Student's t interval estimate of the true location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub method: IntervalMethod,
    /// Sample mean, or the median for [`IntervalMethod::Median`].
    pub center: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// `upper_bound - lower_bound`.
    pub width: f64,
    /// `width / |center|`.
    pub relative_width: f64,
    /// Half-width of the interval.
    pub margin: f64,
    pub t_critical: f64,
    pub confidence_level: f64,
    pub sample_size: usize,
    /// Fewer than two samples; bounds are infinite.
    pub insufficient_data: bool,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower_bound && value <= self.upper_bound
    }

    /// Whether the relative width is within `margin_of_error`.
    pub fn is_sufficient(&self, margin_of_error: f64) -> bool {
        !self.insufficient_data && self.relative_width <= margin_of_error
    }
}

#[derive(Debug, Clone)]
pub struct ConfidenceEstimator {
    pub confidence_level: f64,
}

impl ConfidenceEstimator {
    pub fn new(confidence_level: f64) -> Self {
        Self { confidence_level }
    }

    pub fn estimate(&self, samples: &[f64]) -> ConfidenceInterval {
        let n = samples.len();
        let m = mean(samples);
        if n < 2 {
            return self.degenerate(IntervalMethod::Mean, m, n);
        }

        let standard_error = std_dev(samples) / (n as f64).sqrt();
        self.around(IntervalMethod::Mean, m, standard_error, n)
    }

    /// Interval around the median, insensitive to a minority of extreme samples.
    ///
    /// The spread is `1.4826 * MAD`, or the sample standard deviation when the
    /// MAD is zero, and the standard error carries the `1.2533` factor of the
    /// median's sampling distribution.
    pub fn estimate_robust(&self, samples: &[f64]) -> ConfidenceInterval {
        let n = samples.len();
        let center = median(samples);
        if n < 2 {
            return self.degenerate(IntervalMethod::Median, center, n);
        }

        let deviations: Vec<f64> = samples.iter().map(|x| (x - center).abs()).collect();
        let mad = median(&deviations);
        let sigma = if mad > 0.0 {
            MAD_SIGMA * mad
        } else {
            std_dev(samples)
        };
        let standard_error = MEDIAN_EFFICIENCY * sigma / (n as f64).sqrt();
        self.around(IntervalMethod::Median, center, standard_error, n)
    }

    fn around(
        &self,
        method: IntervalMethod,
        center: f64,
        standard_error: f64,
        n: usize,
    ) -> ConfidenceInterval {
        let t = t_critical(self.confidence_level, (n - 1) as f64);
        let margin = t * standard_error;
        let width = 2.0 * margin;

        ConfidenceInterval {
            method,
            center,
            lower_bound: center - margin,
            upper_bound: center + margin,
            width,
            relative_width: relative(width, center),
            margin,
            t_critical: t,
            confidence_level: self.confidence_level,
            sample_size: n,
            insufficient_data: false,
        }
    }

    fn degenerate(&self, method: IntervalMethod, center: f64, n: usize) -> ConfidenceInterval {
        ConfidenceInterval {
            method,
            center,
            lower_bound: f64::NEG_INFINITY,
            upper_bound: f64::INFINITY,
            width: f64::INFINITY,
            relative_width: f64::INFINITY,
            margin: f64::INFINITY,
            t_critical: f64::INFINITY,
            confidence_level: self.confidence_level,
            sample_size: n,
            insufficient_data: true,
        }
    }

    /// Total sample count at which the interval width should fall to
    /// `margin_of_error * |mean|`, using the normal approximation on the
    /// current mean and spread.
    ///
    /// Returns `None` below two samples or when the mean is zero.
    pub fn required_sample_size(&self, samples: &[f64], margin_of_error: f64) -> Option<usize> {
        if samples.len() < 2 {
            return None;
        }
        let m = mean(samples).abs();
        if m == 0.0 {
            return None;
        }
        let sd = std_dev(samples);
        if sd == 0.0 {
            return Some(2);
        }
        let z = z_quantile(1.0 - (1.0 - self.confidence_level) / 2.0);
        let n = (2.0 * z * sd / (margin_of_error * m)).powi(2).ceil();
        if n.is_finite() {
            Some((n as usize).max(2))
        } else {
            None
        }
    }
}

fn relative(width: f64, mean: f64) -> f64 {
    if width == 0.0 {
        0.0
    } else if mean == 0.0 {
        f64::INFINITY
    } else {
        width / mean.abs()
    }
}
