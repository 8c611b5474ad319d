//! adaptive-bench: sample a benchmark until its result is trustworthy.
//!
//! The [`Controller`] warms a [`MeasurementSource`] up, then collects samples
//! and asks the stopping engine from `adaptive-bench-core` after each
//! evaluation interval whether the estimate is good enough.

pub mod cli;
pub mod config;
pub mod controller;
pub mod failure;
pub mod source;
pub mod warmup;

// Re-export core types for convenience
pub use adaptive_bench_core::report::{
    BenchmarkReport, JsonReporter, ReportError, Reporter, WarmupOutcome, WarmupResult,
};
pub use adaptive_bench_core::stats::{StatisticalTest, SummaryStatistics, WelchTTest};
pub use adaptive_bench_core::{
    AdaptiveConfig, ConfigError, ConfigOptions, Preset, StopReason, StoppingDecision,
    StoppingEngine,
};

// Re-export main types from this crate
pub use cli::{Cli, Command};
pub use config::Config;
pub use controller::{Controller, ControllerError, Phase};
pub use failure::FailureTracker;
pub use source::{from_fn, timed, MeasurementSource, ReplaySource, SourceError};
pub use warmup::WarmupController;
