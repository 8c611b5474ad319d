//! Run configuration for the adaptive controller.
//!
//! [`ConfigOptions`] is the flat, serializable option set; [`AdaptiveConfig`] is
//! the validated, immutable value every component reads from. The only way to
//! obtain an [`AdaptiveConfig`] is through [`AdaptiveConfig::new`], which the
//! presets and deserialization also go through.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats::{OutlierEstimator, OutlierHandling};

/// A violated configuration invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be strictly between 0 and 1, got {value}")]
    NotAFraction { name: &'static str, value: f64 },

    #[error("{name} must be strictly positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("{lower_name} ({lower}) must not exceed {upper_name} ({upper})")]
    BoundsInverted {
        lower_name: &'static str,
        lower: u64,
        upper_name: &'static str,
        upper: u64,
    },

    #[error("max_failure_rate must be in (0, 1], got {0}")]
    FailureRate(f64),

    #[error("significance_reference must be finite, got {0}")]
    NonFiniteReference(f64),
}

/// Flat set of named options. Defaults match the `default` preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOptions {
    /// Confidence level for intervals and significance tests (e.g. 0.95).
    pub confidence_level: f64,
    /// Target relative width of the confidence interval.
    pub margin_of_error: f64,
    /// Smallest standardized effect (Cohen's d) considered meaningful.
    pub minimum_effect: f64,
    pub minimum_sample_size: usize,
    pub maximum_sample_size: usize,
    pub minimum_warmup_iterations: usize,
    pub maximum_warmup_iterations: usize,
    pub warmup_timeout_ms: u64,
    /// CV below which warmup is considered settled.
    pub warmup_cv_threshold: f64,
    /// CV scale used by the stability score.
    pub stability_cv_threshold: f64,
    pub stability_window_size: usize,
    /// Multiplier on the robust spread beyond which a sample is an outlier.
    pub outlier_threshold: f64,
    pub outlier_estimator: OutlierEstimator,
    /// Whether flagged samples are dropped, clamped or only reported.
    pub outlier_handling: OutlierHandling,
    /// Relative change between successive block means that counts as converged.
    pub convergence_threshold: f64,
    pub convergence_window_size: usize,
    pub max_benchmark_duration_ms: u64,
    /// Samples collected between stopping evaluations once the minimum is reached.
    pub evaluation_interval: usize,
    /// Number of trailing invocations the failure ceiling is computed over.
    pub failure_window: usize,
    /// Abort once this fraction of a full trailing window has failed.
    pub max_failure_rate: f64,
    /// Value the one-sample significance test compares the mean against.
    pub significance_reference: f64,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            margin_of_error: 0.05,
            minimum_effect: 0.01,
            minimum_sample_size: 50,
            maximum_sample_size: 10_000,
            minimum_warmup_iterations: 10,
            maximum_warmup_iterations: 1_000,
            warmup_timeout_ms: 5 * 60 * 1_000, // 5 minutes
            warmup_cv_threshold: 0.05,
            stability_cv_threshold: 0.02,
            stability_window_size: 20,
            outlier_threshold: 2.5,
            outlier_estimator: OutlierEstimator::default(),
            outlier_handling: OutlierHandling::default(),
            convergence_threshold: 0.01,
            convergence_window_size: 10,
            max_benchmark_duration_ms: 60 * 60 * 1_000, // 1 hour
            evaluation_interval: 5,
            failure_window: 20,
            max_failure_rate: 0.5,
            significance_reference: 0.0,
        }
    }
}

impl ConfigOptions {
    /// Check every invariant, reporting the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fraction("confidence_level", self.confidence_level)?;
        fraction("margin_of_error", self.margin_of_error)?;

        positive("minimum_effect", self.minimum_effect)?;
        positive("warmup_cv_threshold", self.warmup_cv_threshold)?;
        positive("stability_cv_threshold", self.stability_cv_threshold)?;
        positive("outlier_threshold", self.outlier_threshold)?;
        positive("convergence_threshold", self.convergence_threshold)?;

        positive("minimum_sample_size", self.minimum_sample_size as f64)?;
        positive("maximum_sample_size", self.maximum_sample_size as f64)?;
        positive("minimum_warmup_iterations", self.minimum_warmup_iterations as f64)?;
        positive("maximum_warmup_iterations", self.maximum_warmup_iterations as f64)?;
        positive("stability_window_size", self.stability_window_size as f64)?;
        positive("convergence_window_size", self.convergence_window_size as f64)?;
        positive("warmup_timeout_ms", self.warmup_timeout_ms as f64)?;
        positive("max_benchmark_duration_ms", self.max_benchmark_duration_ms as f64)?;
        positive("evaluation_interval", self.evaluation_interval as f64)?;
        positive("failure_window", self.failure_window as f64)?;

        ordered(
            ("minimum_sample_size", self.minimum_sample_size),
            ("maximum_sample_size", self.maximum_sample_size),
        )?;
        ordered(
            ("minimum_warmup_iterations", self.minimum_warmup_iterations),
            ("maximum_warmup_iterations", self.maximum_warmup_iterations),
        )?;
        ordered(
            ("stability_window_size", self.stability_window_size),
            ("minimum_sample_size", self.minimum_sample_size),
        )?;
        ordered(
            ("convergence_window_size", self.convergence_window_size),
            ("stability_window_size", self.stability_window_size),
        )?;

        if !(self.max_failure_rate > 0.0 && self.max_failure_rate <= 1.0) {
            return Err(ConfigError::FailureRate(self.max_failure_rate));
        }
        if !self.significance_reference.is_finite() {
            return Err(ConfigError::NonFiniteReference(self.significance_reference));
        }

        Ok(())
    }
}

fn fraction(name: &'static str, value: f64) -> Result<(), ConfigError> {
    // Written so that NaN fails the check.
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::NotAFraction { name, value })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn ordered(lower: (&'static str, usize), upper: (&'static str, usize)) -> Result<(), ConfigError> {
    if lower.1 <= upper.1 {
        Ok(())
    } else {
        Err(ConfigError::BoundsInverted {
            lower_name: lower.0,
            lower: lower.1 as u64,
            upper_name: upper.0,
            upper: upper.1 as u64,
        })
    }
}

/// Validated, immutable configuration shared read-only for the life of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConfigOptions", into = "ConfigOptions")]
pub struct AdaptiveConfig {
    options: ConfigOptions,
}

impl AdaptiveConfig {
    /// Validate `options` and freeze them.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant; nothing is clamped.
    pub fn new(options: ConfigOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Build one of the canned presets through the same validation path.
    pub fn from_preset(preset: Preset) -> Result<Self, ConfigError> {
        Self::new(preset.options())
    }

    pub fn options(&self) -> &ConfigOptions {
        &self.options
    }

    pub fn confidence_level(&self) -> f64 {
        self.options.confidence_level
    }

    /// Significance level implied by the confidence level.
    pub fn alpha(&self) -> f64 {
        1.0 - self.options.confidence_level
    }

    pub fn margin_of_error(&self) -> f64 {
        self.options.margin_of_error
    }

    pub fn minimum_effect(&self) -> f64 {
        self.options.minimum_effect
    }

    pub fn minimum_sample_size(&self) -> usize {
        self.options.minimum_sample_size
    }

    pub fn maximum_sample_size(&self) -> usize {
        self.options.maximum_sample_size
    }

    pub fn minimum_warmup_iterations(&self) -> usize {
        self.options.minimum_warmup_iterations
    }

    pub fn maximum_warmup_iterations(&self) -> usize {
        self.options.maximum_warmup_iterations
    }

    pub fn warmup_timeout(&self) -> Duration {
        Duration::from_millis(self.options.warmup_timeout_ms)
    }

    pub fn warmup_cv_threshold(&self) -> f64 {
        self.options.warmup_cv_threshold
    }

    pub fn stability_cv_threshold(&self) -> f64 {
        self.options.stability_cv_threshold
    }

    pub fn stability_window_size(&self) -> usize {
        self.options.stability_window_size
    }

    pub fn outlier_threshold(&self) -> f64 {
        self.options.outlier_threshold
    }

    pub fn outlier_estimator(&self) -> OutlierEstimator {
        self.options.outlier_estimator
    }

    pub fn outlier_handling(&self) -> OutlierHandling {
        self.options.outlier_handling
    }

    pub fn convergence_threshold(&self) -> f64 {
        self.options.convergence_threshold
    }

    pub fn convergence_window_size(&self) -> usize {
        self.options.convergence_window_size
    }

    pub fn max_benchmark_duration(&self) -> Duration {
        Duration::from_millis(self.options.max_benchmark_duration_ms)
    }

    pub fn evaluation_interval(&self) -> usize {
        self.options.evaluation_interval
    }

    pub fn failure_window(&self) -> usize {
        self.options.failure_window
    }

    pub fn max_failure_rate(&self) -> f64 {
        self.options.max_failure_rate
    }

    pub fn significance_reference(&self) -> f64 {
        self.options.significance_reference
    }
}

impl TryFrom<ConfigOptions> for AdaptiveConfig {
    type Error = ConfigError;

    fn try_from(options: ConfigOptions) -> Result<Self, Self::Error> {
        Self::new(options)
    }
}

impl From<AdaptiveConfig> for ConfigOptions {
    fn from(config: AdaptiveConfig) -> Self {
        config.options
    }
}

/// The canned option bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    Quick,
    Default,
    HighPrecision,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Quick, Preset::Default, Preset::HighPrecision];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Quick => "quick",
            Preset::Default => "default",
            Preset::HighPrecision => "high-precision",
        }
    }

    pub fn use_case(self) -> &'static str {
        match self {
            Preset::Quick => "Quick performance checks and development testing",
            Preset::Default => "General purpose benchmarking with balanced accuracy and speed",
            Preset::HighPrecision => {
                "High-precision measurements for research and detailed analysis"
            }
        }
    }

    pub fn estimated_duration(self) -> &'static str {
        match self {
            Preset::Quick => "30 seconds - 15 minutes",
            Preset::Default => "5-30 minutes",
            Preset::HighPrecision => "30 minutes - 6 hours",
        }
    }

    pub fn options(self) -> ConfigOptions {
        match self {
            Preset::Quick => ConfigOptions {
                confidence_level: 0.90,
                margin_of_error: 0.10,
                minimum_effect: 0.05,
                minimum_sample_size: 20,
                maximum_sample_size: 1_000,
                minimum_warmup_iterations: 5,
                maximum_warmup_iterations: 100,
                warmup_timeout_ms: 60 * 1_000,
                warmup_cv_threshold: 0.10,
                stability_cv_threshold: 0.10,
                stability_window_size: 5,
                outlier_threshold: 2.0,
                convergence_threshold: 0.05,
                convergence_window_size: 5,
                max_benchmark_duration_ms: 15 * 60 * 1_000,
                ..ConfigOptions::default()
            },
            Preset::Default => ConfigOptions::default(),
            Preset::HighPrecision => ConfigOptions {
                confidence_level: 0.99,
                margin_of_error: 0.01,
                minimum_effect: 0.005,
                minimum_sample_size: 100,
                maximum_sample_size: 50_000,
                minimum_warmup_iterations: 50,
                maximum_warmup_iterations: 5_000,
                warmup_timeout_ms: 10 * 60 * 1_000,
                warmup_cv_threshold: 0.01,
                stability_cv_threshold: 0.005,
                stability_window_size: 50,
                outlier_threshold: 3.0,
                convergence_threshold: 0.005,
                convergence_window_size: 25,
                max_benchmark_duration_ms: 6 * 60 * 60 * 1_000,
                ..ConfigOptions::default()
            },
        }
    }

    /// Pick a preset for the stated requirements.
    ///
    /// High accuracy or a production target wins over everything else; low
    /// accuracy or a tight time budget selects `quick`.
    pub fn recommend(
        accuracy: Accuracy,
        time_constraint: TimeConstraint,
        production: bool,
    ) -> Recommendation {
        let preset = if accuracy == Accuracy::High || production {
            Preset::HighPrecision
        } else if accuracy == Accuracy::Low || time_constraint == TimeConstraint::Tight {
            Preset::Quick
        } else {
            Preset::Default
        };

        let mut reasoning = String::from("Configuration selected based on: ");
        if production {
            reasoning.push_str("Production environment requires high precision. ");
        }
        reasoning.push_str(match accuracy {
            Accuracy::High => {
                "High accuracy requirements necessitate extensive sampling and statistical rigor. "
            }
            Accuracy::Low => "Low accuracy requirements allow for quick measurements. ",
            Accuracy::Medium => "Medium accuracy provides balanced approach. ",
        });
        reasoning.push_str(match time_constraint {
            TimeConstraint::Tight => {
                "Time constraints require minimal sampling with basic statistical checks."
            }
            TimeConstraint::Relaxed => "Relaxed time constraints allow for comprehensive analysis.",
            TimeConstraint::Moderate => {
                "Moderate time constraints balanced with statistical requirements."
            }
        });

        Recommendation { preset, reasoning }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quick" | "fast" => Ok(Preset::Quick),
            "default" => Ok(Preset::Default),
            "high-precision" | "high_precision" => Ok(Preset::HighPrecision),
            other => Err(format!(
                "unknown preset '{}' (expected quick, default or high-precision)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeConstraint {
    Tight,
    Moderate,
    Relaxed,
}

impl FromStr for Accuracy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Accuracy::Low),
            "medium" => Ok(Accuracy::Medium),
            "high" => Ok(Accuracy::High),
            other => Err(format!("unknown accuracy '{}' (expected low, medium or high)", other)),
        }
    }
}

impl FromStr for TimeConstraint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tight" => Ok(TimeConstraint::Tight),
            "moderate" => Ok(TimeConstraint::Moderate),
            "relaxed" => Ok(TimeConstraint::Relaxed),
            other => Err(format!(
                "unknown time constraint '{}' (expected tight, moderate or relaxed)",
                other
            )),
        }
    }
}

/// A preset suggestion together with the reasons it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub preset: Preset,
    pub reasoning: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_presets_are_valid() {
        for preset in Preset::ALL {
            let config = AdaptiveConfig::from_preset(preset).unwrap();
            assert_eq!(config.options(), &preset.options());
        }
    }

    #[test]
    fn test_quick_preset_values() {
        let config = AdaptiveConfig::from_preset(Preset::Quick).unwrap();
        assert_eq!(config.confidence_level(), 0.90);
        assert_eq!(config.margin_of_error(), 0.10);
        assert_eq!(config.minimum_sample_size(), 20);
        assert_eq!(config.maximum_sample_size(), 1_000);
        assert_eq!(config.warmup_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_benchmark_duration(), Duration::from_secs(15 * 60));
        assert!((config.alpha() - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_parse_requirement_levels() {
        assert_eq!("HIGH".parse::<Accuracy>(), Ok(Accuracy::High));
        assert_eq!("tight".parse::<TimeConstraint>(), Ok(TimeConstraint::Tight));
        assert!("extreme".parse::<Accuracy>().is_err());
        assert!("".parse::<TimeConstraint>().is_err());
    }

    #[test]
    fn test_default_matches_default_preset() {
        assert_eq!(ConfigOptions::default(), Preset::Default.options());
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        for value in [0.0, 1.0, 1.5, -0.1, f64::NAN] {
            let options = ConfigOptions {
                confidence_level: value,
                ..ConfigOptions::default()
            };
            match AdaptiveConfig::new(options) {
                Err(ConfigError::NotAFraction { name, .. }) => {
                    assert_eq!(name, "confidence_level")
                }
                other => panic!("expected NotAFraction, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_rejects_inverted_sample_bounds() {
        let options = ConfigOptions {
            minimum_sample_size: 500,
            maximum_sample_size: 100,
            ..ConfigOptions::default()
        };
        let err = AdaptiveConfig::new(options).unwrap_err();
        assert_eq!(
            err,
            ConfigError::BoundsInverted {
                lower_name: "minimum_sample_size",
                lower: 500,
                upper_name: "maximum_sample_size",
                upper: 100,
            }
        );
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn test_rejects_window_larger_than_minimum() {
        let options = ConfigOptions {
            stability_window_size: 60,
            ..ConfigOptions::default()
        };
        assert!(matches!(
            AdaptiveConfig::new(options),
            Err(ConfigError::BoundsInverted {
                lower_name: "stability_window_size",
                ..
            })
        ));

        let options = ConfigOptions {
            convergence_window_size: 30,
            ..ConfigOptions::default()
        };
        assert!(matches!(
            AdaptiveConfig::new(options),
            Err(ConfigError::BoundsInverted {
                lower_name: "convergence_window_size",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let options = ConfigOptions {
            outlier_threshold: 0.0,
            ..ConfigOptions::default()
        };
        assert!(matches!(
            AdaptiveConfig::new(options),
            Err(ConfigError::NotPositive {
                name: "outlier_threshold",
                ..
            })
        ));

        let options = ConfigOptions {
            max_benchmark_duration_ms: 0,
            ..ConfigOptions::default()
        };
        assert!(AdaptiveConfig::new(options).is_err());
    }

    #[test]
    fn test_rejects_failure_rate_outside_range() {
        for value in [0.0, 1.01] {
            let options = ConfigOptions {
                max_failure_rate: value,
                ..ConfigOptions::default()
            };
            assert_eq!(
                AdaptiveConfig::new(options),
                Err(ConfigError::FailureRate(value))
            );
        }
        let options = ConfigOptions {
            max_failure_rate: 1.0,
            ..ConfigOptions::default()
        };
        assert!(AdaptiveConfig::new(options).is_ok());
    }

    #[test]
    fn test_deserialization_is_validated() {
        let json = r#"{"minimum_sample_size": 10, "maximum_sample_size": 5}"#;
        let result: Result<AdaptiveConfig, _> = serde_json::from_str(json);
        assert!(result.is_err());

        let json = r#"{"confidence_level": 0.99}"#;
        let config: AdaptiveConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.confidence_level(), 0.99);
        assert_eq!(config.minimum_sample_size(), 50);
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("quick".parse::<Preset>().unwrap(), Preset::Quick);
        assert_eq!("High-Precision".parse::<Preset>().unwrap(), Preset::HighPrecision);
        assert!("turbo".parse::<Preset>().is_err());
    }

    #[test]
    fn test_recommend() {
        let rec = Preset::recommend(Accuracy::Medium, TimeConstraint::Moderate, true);
        assert_eq!(rec.preset, Preset::HighPrecision);
        assert!(rec.reasoning.contains("Production environment"));

        let rec = Preset::recommend(Accuracy::High, TimeConstraint::Tight, false);
        assert_eq!(rec.preset, Preset::HighPrecision);

        let rec = Preset::recommend(Accuracy::Medium, TimeConstraint::Tight, false);
        assert_eq!(rec.preset, Preset::Quick);

        let rec = Preset::recommend(Accuracy::Low, TimeConstraint::Relaxed, false);
        assert_eq!(rec.preset, Preset::Quick);

        let rec = Preset::recommend(Accuracy::Medium, TimeConstraint::Relaxed, false);
        assert_eq!(rec.preset, Preset::Default);
        assert!(rec.reasoning.ends_with("comprehensive analysis."));
    }

    proptest! {
        #[test]
        fn prop_valid_configs_keep_bounds_ordered(
            min_samples in 1usize..200,
            max_samples in 1usize..200,
            min_warmup in 1usize..50,
            max_warmup in 1usize..50,
        ) {
            let options = ConfigOptions {
                minimum_sample_size: min_samples,
                maximum_sample_size: max_samples,
                minimum_warmup_iterations: min_warmup,
                maximum_warmup_iterations: max_warmup,
                stability_window_size: 1,
                convergence_window_size: 1,
                ..ConfigOptions::default()
            };
            match AdaptiveConfig::new(options) {
                Ok(config) => {
                    prop_assert!(config.minimum_sample_size() <= config.maximum_sample_size());
                    prop_assert!(
                        config.minimum_warmup_iterations() <= config.maximum_warmup_iterations()
                    );
                }
                Err(ConfigError::BoundsInverted { .. }) => {
                    prop_assert!(min_samples > max_samples || min_warmup > max_warmup);
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }

        #[test]
        fn prop_confidence_outside_unit_interval_rejected(value in prop_oneof![
            -10.0f64..=0.0,
            1.0f64..10.0,
        ]) {
            let options = ConfigOptions {
                confidence_level: value,
                ..ConfigOptions::default()
            };
            let is_fraction_error = matches!(
                AdaptiveConfig::new(options),
                Err(ConfigError::NotAFraction { .. })
            );
            prop_assert!(is_fraction_error);
        }
    }
}
