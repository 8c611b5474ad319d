//! Outlier detection.
//!
//! The default estimator is the median/MAD modified z-score: a sample is
//! flagged when `|x - median| / (MAD / 0.6745)` exceeds the threshold. When
//! more than half of the samples coincide the MAD is zero and nothing is
//! flagged; a quantized timer that mostly reads one tick is not noisy, and
//! its minority level is real data. The classic mean/standard-deviation
//! z-score and Tukey's interquartile fences are available as alternatives.
//!
//! What happens to flagged samples is chosen separately by
//! [`OutlierHandling`].

use serde::{Deserialize, Serialize};

use super::{mean, median, percentile_sorted, sorted, std_dev};

/// Below this many samples no point is ever flagged.
pub const MIN_OUTLIER_SAMPLES: usize = 5;

/// Consistency constant relating MAD to the normal standard deviation.
const MAD_SCALE: f64 = 0.6745;
/// Interquartile range of the standard normal distribution.
const IQR_SCALE: f64 = 1.349;
/// Tukey's fence multiplier for the [`OutlierEstimator::Iqr`] estimator.
pub const IQR_FENCE: f64 = 1.5;

/// Center/spread estimator used to standardize samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierEstimator {
    /// Median and median absolute deviation.
    #[default]
    Mad,
    /// Mean and sample standard deviation.
    ZScore,
    /// Tukey fences at `Q1 - 1.5 * IQR` and `Q3 + 1.5 * IQR`. The configured
    /// threshold does not apply.
    Iqr,
}

/// What the detector does with flagged samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierHandling {
    /// Drop flagged samples from the analyzed set.
    #[default]
    Remove,
    /// Replace a flagged sample with the nearest value that was not flagged.
    Winsorize,
    /// Report flagged samples but analyze the input as is.
    MarkOnly,
}

/// Result of a detection pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierAnalysis {
    pub estimator: OutlierEstimator,
    pub handling: OutlierHandling,
    pub threshold: f64,
    pub total_count: usize,
    pub outlier_count: usize,
    /// `outlier_count / total_count`, zero for an empty input.
    pub outlier_rate: f64,
    /// Positions of flagged samples in the input sequence.
    pub outlier_indices: Vec<usize>,
    pub low_outlier_count: usize,
    pub high_outlier_count: usize,
    /// Center used for standardization (median or mean).
    pub center: f64,
    /// Spread in the units of the samples, already converted to a standard-deviation scale.
    pub spread: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// True when there were too few samples to estimate anything.
    pub insufficient_data: bool,
    /// Samples handed on to the analysis, order preserved. Flagged samples
    /// are dropped, clamped or kept according to `handling`.
    pub cleaned_samples: Vec<f64>,
}

impl OutlierAnalysis {
    fn untouched(samples: &[f64], detector: &OutlierDetector) -> Self {
        Self {
            estimator: detector.estimator,
            handling: detector.handling,
            threshold: detector.threshold,
            total_count: samples.len(),
            outlier_count: 0,
            outlier_rate: 0.0,
            outlier_indices: Vec::new(),
            low_outlier_count: 0,
            high_outlier_count: 0,
            center: mean(samples),
            spread: 0.0,
            lower_bound: f64::NEG_INFINITY,
            upper_bound: f64::INFINITY,
            insufficient_data: samples.len() < MIN_OUTLIER_SAMPLES,
            cleaned_samples: samples.to_vec(),
        }
    }

    pub fn cleaned_count(&self) -> usize {
        self.cleaned_samples.len()
    }
}

/// Center, standard-deviation-scale spread and acceptance bounds.
struct Fences {
    center: f64,
    spread: f64,
    lower: f64,
    upper: f64,
}

/// Flags samples whose standardized distance from the center exceeds `threshold`.
#[derive(Debug, Clone)]
pub struct OutlierDetector {
    pub estimator: OutlierEstimator,
    pub threshold: f64,
    pub handling: OutlierHandling,
}

impl OutlierDetector {
    /// Detector that removes flagged samples.
    pub fn new(estimator: OutlierEstimator, threshold: f64) -> Self {
        Self {
            estimator,
            threshold,
            handling: OutlierHandling::default(),
        }
    }

    pub fn with_handling(mut self, handling: OutlierHandling) -> Self {
        self.handling = handling;
        self
    }

    pub fn detect(&self, samples: &[f64]) -> OutlierAnalysis {
        if samples.len() < MIN_OUTLIER_SAMPLES {
            return OutlierAnalysis::untouched(samples, self);
        }

        let fences = match self.fences(samples) {
            Ok(fences) => fences,
            Err(center) => {
                // No usable spread: MAD or IQR is zero, or every sample sits on the center.
                let mut analysis = OutlierAnalysis::untouched(samples, self);
                analysis.center = center;
                return analysis;
            }
        };

        let mut outlier_indices = Vec::new();
        let mut low_outlier_count = 0;
        let mut high_outlier_count = 0;
        // Range of the samples that were not flagged, for winsorizing.
        let mut kept_min = f64::INFINITY;
        let mut kept_max = f64::NEG_INFINITY;

        for (i, &x) in samples.iter().enumerate() {
            if x < fences.lower {
                low_outlier_count += 1;
                outlier_indices.push(i);
            } else if x > fences.upper {
                high_outlier_count += 1;
                outlier_indices.push(i);
            } else {
                kept_min = kept_min.min(x);
                kept_max = kept_max.max(x);
            }
        }

        let cleaned_samples = match self.handling {
            OutlierHandling::Remove => samples
                .iter()
                .copied()
                .filter(|x| *x >= fences.lower && *x <= fences.upper)
                .collect(),
            OutlierHandling::Winsorize if kept_min <= kept_max => samples
                .iter()
                .map(|x| x.clamp(kept_min, kept_max))
                .collect(),
            OutlierHandling::Winsorize | OutlierHandling::MarkOnly => samples.to_vec(),
        };

        let outlier_count = outlier_indices.len();
        OutlierAnalysis {
            estimator: self.estimator,
            handling: self.handling,
            threshold: self.threshold,
            total_count: samples.len(),
            outlier_count,
            outlier_rate: outlier_count as f64 / samples.len() as f64,
            outlier_indices,
            low_outlier_count,
            high_outlier_count,
            center: fences.center,
            spread: fences.spread,
            lower_bound: fences.lower,
            upper_bound: fences.upper,
            insufficient_data: false,
            cleaned_samples,
        }
    }

    /// Acceptance bounds for `samples`, or the center alone when the spread is
    /// zero or not finite.
    fn fences(&self, samples: &[f64]) -> Result<Fences, f64> {
        let (center, spread, lower, upper) = match self.estimator {
            OutlierEstimator::Mad => {
                let center = median(samples);
                let deviations: Vec<f64> = samples.iter().map(|x| (x - center).abs()).collect();
                let spread = median(&deviations) / MAD_SCALE;
                (
                    center,
                    spread,
                    center - self.threshold * spread,
                    center + self.threshold * spread,
                )
            }
            OutlierEstimator::ZScore => {
                let center = mean(samples);
                let spread = std_dev(samples);
                (
                    center,
                    spread,
                    center - self.threshold * spread,
                    center + self.threshold * spread,
                )
            }
            OutlierEstimator::Iqr => {
                let values = sorted(samples);
                let q1 = percentile_sorted(&values, 25.0);
                let q3 = percentile_sorted(&values, 75.0);
                let iqr = q3 - q1;
                (
                    percentile_sorted(&values, 50.0),
                    iqr / IQR_SCALE,
                    q1 - IQR_FENCE * iqr,
                    q3 + IQR_FENCE * iqr,
                )
            }
        };

        if spread == 0.0 || !spread.is_finite() {
            return Err(center);
        }
        Ok(Fences {
            center,
            spread,
            lower,
            upper,
        })
    }
}
