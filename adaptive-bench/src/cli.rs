//! Command-line interface for adaptive-bench.

use std::path::PathBuf;

use adaptive_bench_core::{Accuracy, Preset, TimeConstraint};
use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "adaptive-bench")]
#[command(about = "Sample a benchmark until its result is statistically trustworthy")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file (defaults to .adaptive-bench.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Preset to start from (quick, default, high-precision)
    #[arg(long, global = true)]
    pub preset: Option<Preset>,

    /// Confidence level for intervals and tests (0.0-1.0)
    #[arg(long, global = true)]
    pub confidence_level: Option<f64>,

    /// Target relative width of the confidence interval (0.0-1.0)
    #[arg(long, global = true)]
    pub margin_of_error: Option<f64>,

    /// Samples to collect before the first stopping evaluation
    #[arg(long, global = true)]
    pub min_samples: Option<usize>,

    /// Hard upper bound on collected samples
    #[arg(long, global = true)]
    pub max_samples: Option<usize>,

    /// Time budget for the sampling phase in milliseconds
    #[arg(long, global = true)]
    pub max_duration_ms: Option<u64>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate a recorded sequence of durations (ms) and print the stopping decision
    Analyze {
        /// File with a JSON array or whitespace-separated durations
        file: PathBuf,

        /// Elapsed sampling time to evaluate the time budget against
        #[arg(long, default_value_t = 0)]
        elapsed_ms: u64,
    },

    /// Run the full adaptive loop against a recorded sequence, replayed cyclically
    Simulate {
        /// File with a JSON array or whitespace-separated durations
        file: PathBuf,
    },

    /// Compare two recorded sequences with Welch's t-test
    Compare { baseline: PathBuf, candidate: PathBuf },

    /// Show the presets and their options
    Presets,

    /// Suggest a preset for the given requirements
    Recommend {
        /// low, medium or high
        #[arg(long, default_value = "medium")]
        accuracy: Accuracy,

        /// tight, moderate or relaxed
        #[arg(long, default_value = "moderate")]
        time_constraint: TimeConstraint,

        /// Results feed production decisions
        #[arg(long)]
        production: bool,
    },
}

impl Cli {
    /// Apply CLI overrides to the configuration.
    ///
    /// CLI arguments take precedence over config file values.
    pub fn apply_to_config(&self, config: &mut Config) {
        if let Some(preset) = self.preset {
            config.benchmark.preset = preset;
        }

        let overrides = &mut config.overrides;
        if let Some(confidence_level) = self.confidence_level {
            overrides.confidence_level = Some(confidence_level);
        }
        if let Some(margin_of_error) = self.margin_of_error {
            overrides.margin_of_error = Some(margin_of_error);
        }
        if let Some(min_samples) = self.min_samples {
            overrides.minimum_sample_size = Some(min_samples);
        }
        if let Some(max_samples) = self.max_samples {
            overrides.maximum_sample_size = Some(max_samples);
        }
        if let Some(max_duration_ms) = self.max_duration_ms {
            overrides.max_benchmark_duration_ms = Some(max_duration_ms);
        }
    }
}
