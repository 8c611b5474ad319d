//! Core statistics for adaptive benchmarking.
//!
//! This crate is free of I/O and timing: it validates configuration, analyzes
//! measurement sequences and decides whether enough samples have been
//! collected. The `adaptive-bench` crate drives it against live measurement
//! sources.

pub mod config;
pub mod report;
pub mod stats;
pub mod stopping;

// Re-export main types for convenience
pub use config::{
    Accuracy, AdaptiveConfig, ConfigError, ConfigOptions, Preset, Recommendation, TimeConstraint,
};
pub use report::{BenchmarkReport, JsonReporter, ReportError, Reporter, WarmupOutcome, WarmupResult};
pub use stats::{
    ComparisonResult, ConfidenceEstimator, ConfidenceInterval, IntervalMethod, OutlierAnalysis,
    OutlierDetector, OutlierEstimator, OutlierHandling, Side, SignificanceDetector,
    SignificanceResult, StabilityAnalysis, StabilityAnalyzer, StabilityIssue, StatisticalTest,
    SummaryStatistics, WelchTTest,
};
pub use stopping::{ControlState, DecisionMetrics, Evaluation, StopReason, StoppingDecision, StoppingEngine};
