use std::io::Write;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use thiserror::Error;

use crate::config::AdaptiveConfig;
use crate::stats::{
    ConfidenceInterval, OutlierAnalysis, SignificanceResult, StabilityAnalysis, SummaryStatistics,
};
use crate::stopping::{StopReason, StoppingDecision};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How the warmup phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupOutcome {
    /// Rolling CV fell below the warmup threshold.
    Stabilized,
    MaxIterations,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmupResult {
    /// True only when warmup ended because variation settled.
    pub completed: bool,
    pub outcome: WarmupOutcome,
    /// Successful iterations; failures are not counted.
    pub iterations: usize,
    pub failures: usize,
    pub elapsed: Duration,
    /// CV over the rolling window at the end of warmup.
    pub final_cv: f64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub id: String,
    pub started_at: SystemTime,
    pub total_duration: Duration,
    /// Time spent after warmup, the span the duration budget applies to.
    pub sampling_duration: Duration,
    pub config: AdaptiveConfig,
    pub warmup: WarmupResult,
    pub raw_count: usize,
    pub cleaned_count: usize,
    pub failed_invocations: usize,
    pub raw_samples: Vec<f64>,
    pub outliers: OutlierAnalysis,
    pub interval: ConfidenceInterval,
    /// Median-based interval over the raw samples.
    pub robust_interval: ConfidenceInterval,
    pub significance: SignificanceResult,
    pub stability: StabilityAnalysis,
    pub decision: StoppingDecision,
    /// Computed on the cleaned sequence.
    pub summary: SummaryStatistics,
    /// Stopped on a statistical criterion rather than a limit or cancellation.
    pub success: bool,
}

impl BenchmarkReport {
    pub fn cleaned_samples(&self) -> &[f64] {
        &self.outliers.cleaned_samples
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.decision.primary_reason
    }
}

pub trait Reporter: Send + Sync {
    fn report(&self, report: &BenchmarkReport, out: &mut dyn Write) -> Result<(), ReportError>;
}

mod json;
pub use json::JsonReporter;
