use serde::Serialize;

use super::{coefficient_of_variation, mean, percentile_sorted, sorted, std_dev};

/// Descriptive statistics of a (cleaned) measurement sequence.
///
/// All fields are zero for an empty sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    /// Median absolute deviation around the median.
    pub mad: f64,
    /// Interquartile range.
    pub iqr: f64,
    /// Mean after dropping 10% from each tail.
    pub trimmed_mean: f64,
    /// `1.4826 * mad / median`.
    pub robust_cv: f64,
}

impl SummaryStatistics {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let values = sorted(samples);
        let median = percentile_sorted(&values, 50.0);
        let deviations = sorted(&values.iter().map(|x| (x - median).abs()).collect::<Vec<_>>());
        let mad = percentile_sorted(&deviations, 50.0);

        let trim = values.len() / 10;
        let trimmed_mean = mean(&values[trim..values.len() - trim]);

        Self {
            count: values.len(),
            mean: mean(&values),
            std_dev: std_dev(&values),
            coefficient_of_variation: coefficient_of_variation(&values),
            min: values[0],
            max: values[values.len() - 1],
            median,
            p95: percentile_sorted(&values, 95.0),
            p99: percentile_sorted(&values, 99.0),
            mad,
            iqr: percentile_sorted(&values, 75.0) - percentile_sorted(&values, 25.0),
            trimmed_mean,
            robust_cv: if median == 0.0 {
                0.0
            } else {
                1.4826 * mad / median.abs()
            },
        }
    }
}
