//! Configuration loading for adaptive-bench.
//!
//! A config file picks a preset and may override any individual option.
//! Validation happens when the result is turned into an [`AdaptiveConfig`].

use std::path::Path;

use adaptive_bench_core::{
    AdaptiveConfig, ConfigError, ConfigOptions, OutlierEstimator, OutlierHandling, Preset,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration for adaptive-bench.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub benchmark: BenchmarkConfig,
    /// Per-option overrides applied on top of the preset.
    pub overrides: Overrides,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub preset: Preset,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            preset: Preset::Default,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Overrides {
    pub confidence_level: Option<f64>,
    pub margin_of_error: Option<f64>,
    pub minimum_effect: Option<f64>,
    pub minimum_sample_size: Option<usize>,
    pub maximum_sample_size: Option<usize>,
    pub minimum_warmup_iterations: Option<usize>,
    pub maximum_warmup_iterations: Option<usize>,
    pub warmup_timeout_ms: Option<u64>,
    pub warmup_cv_threshold: Option<f64>,
    pub stability_cv_threshold: Option<f64>,
    pub stability_window_size: Option<usize>,
    pub outlier_threshold: Option<f64>,
    pub outlier_estimator: Option<OutlierEstimator>,
    pub outlier_handling: Option<OutlierHandling>,
    pub convergence_threshold: Option<f64>,
    pub convergence_window_size: Option<usize>,
    pub max_benchmark_duration_ms: Option<u64>,
    pub evaluation_interval: Option<usize>,
    pub failure_window: Option<usize>,
    pub max_failure_rate: Option<f64>,
    pub significance_reference: Option<f64>,
}

macro_rules! apply_overrides {
    ($overrides:expr, $options:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = $overrides.$field {
                $options.$field = value;
            }
        )*
    };
}

impl Overrides {
    pub fn apply(&self, options: &mut ConfigOptions) {
        apply_overrides!(
            self,
            options,
            [
                confidence_level,
                margin_of_error,
                minimum_effect,
                minimum_sample_size,
                maximum_sample_size,
                minimum_warmup_iterations,
                maximum_warmup_iterations,
                warmup_timeout_ms,
                warmup_cv_threshold,
                stability_cv_threshold,
                stability_window_size,
                outlier_threshold,
                outlier_estimator,
                outlier_handling,
                convergence_threshold,
                convergence_window_size,
                max_benchmark_duration_ms,
                evaluation_interval,
                failure_window,
                max_failure_rate,
                significance_reference,
            ]
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter when `RUST_LOG` is unset, e.g. `"info"`.
    pub level: Option<String>,
}

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".adaptive-bench.toml";

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load `.adaptive-bench.toml` from the current directory, or use defaults if it is absent.
    pub fn load_or_default() -> Result<Config> {
        let path = Path::new(DEFAULT_CONFIG_FILE);

        if path.exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from `path` if given, otherwise fall back to [`Config::load_or_default`].
    pub fn load_from(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(p) => Self::load(p),
            None => Self::load_or_default(),
        }
    }

    /// Preset options with the overrides applied, validated.
    pub fn adaptive_config(&self) -> Result<AdaptiveConfig, ConfigError> {
        let mut options = self.benchmark.preset.options();
        self.overrides.apply(&mut options);
        AdaptiveConfig::new(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.benchmark.preset, Preset::Default);
        assert_eq!(config.overrides, Overrides::default());
        assert!(config.logging.level.is_none());

        let adaptive = config.adaptive_config().unwrap();
        assert_eq!(adaptive.options(), &ConfigOptions::default());
    }

    #[test]
    fn test_load_preset_with_overrides() {
        let toml_content = r#"
[benchmark]
preset = "quick"

[overrides]
confidence_level = 0.95
maximum_sample_size = 500
outlier_estimator = "z_score"
outlier_handling = "winsorize"

[logging]
level = "debug"
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.benchmark.preset, Preset::Quick);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));

        let adaptive = config.adaptive_config().unwrap();
        // Overridden values
        assert_eq!(adaptive.confidence_level(), 0.95);
        assert_eq!(adaptive.maximum_sample_size(), 500);
        assert_eq!(adaptive.outlier_estimator(), OutlierEstimator::ZScore);
        assert_eq!(adaptive.outlier_handling(), OutlierHandling::Winsorize);
        // Preset values
        assert_eq!(adaptive.margin_of_error(), 0.10);
        assert_eq!(adaptive.minimum_sample_size(), 20);
    }

    #[test]
    fn test_invalid_override_rejected_on_conversion() {
        let config = Config {
            overrides: Overrides {
                margin_of_error: Some(1.5),
                ..Overrides::default()
            },
            ..Config::default()
        };

        match config.adaptive_config() {
            Err(ConfigError::NotAFraction { name, value }) => {
                assert_eq!(name, "margin_of_error");
                assert_eq!(value, 1.5);
            }
            other => panic!("expected NotAFraction, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_override_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[overrides]\nconfidence = 0.9\n").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"this is not valid toml {{{{").unwrap();

        let result = Config::load(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config {
            benchmark: BenchmarkConfig {
                preset: Preset::HighPrecision,
            },
            overrides: Overrides {
                evaluation_interval: Some(25),
                ..Overrides::default()
            },
            logging: LoggingConfig {
                level: Some("info".to_string()),
            },
        };
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("preset = \"high-precision\""));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}
