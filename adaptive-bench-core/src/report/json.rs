use std::io::Write;

use serde::Serialize;

use super::{BenchmarkReport, ReportError, Reporter};

/// Writes reports as JSON. Non-finite numbers are emitted as `null`.
#[derive(Debug, Clone)]
pub struct JsonReporter {
    pretty: bool,
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonReporter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// Single-line output, one report per line.
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    /// Serialize any value the way reports are serialized.
    pub fn write_value<T: Serialize + ?Sized>(
        &self,
        value: &T,
        out: &mut dyn Write,
    ) -> Result<(), ReportError> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *out, value)?;
        } else {
            serde_json::to_writer(&mut *out, value)?;
        }
        writeln!(out)?;
        Ok(())
    }
}

impl Reporter for JsonReporter {
    fn report(&self, report: &BenchmarkReport, out: &mut dyn Write) -> Result<(), ReportError> {
        self.write_value(report, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdaptiveConfig, Preset};
    use crate::report::{WarmupOutcome, WarmupResult};
    use crate::stats::SummaryStatistics;
    use crate::stopping::StoppingEngine;
    use std::time::{Duration, SystemTime};

    fn sample_report() -> BenchmarkReport {
        let config = AdaptiveConfig::from_preset(Preset::Quick).unwrap();
        let engine = StoppingEngine::new(&config);
        let raw = vec![10.0; 20];
        let (evaluation, decision) = engine.evaluate(&raw, Duration::from_millis(200));

        BenchmarkReport {
            id: "run-1".to_string(),
            started_at: SystemTime::UNIX_EPOCH,
            total_duration: Duration::from_millis(250),
            sampling_duration: Duration::from_millis(200),
            config,
            warmup: WarmupResult {
                completed: true,
                outcome: WarmupOutcome::Stabilized,
                iterations: 5,
                failures: 0,
                elapsed: Duration::from_millis(50),
                final_cv: 0.0,
            },
            raw_count: raw.len(),
            cleaned_count: evaluation.outliers.cleaned_count(),
            failed_invocations: 0,
            summary: SummaryStatistics::from_samples(evaluation.cleaned_samples()),
            raw_samples: raw,
            outliers: evaluation.outliers,
            interval: evaluation.interval,
            robust_interval: evaluation.robust_interval,
            significance: evaluation.significance,
            stability: evaluation.stability,
            success: decision.is_successful(),
            decision,
        }
    }

    #[test]
    fn test_json_report_fields() {
        let mut out = Vec::new();
        JsonReporter::new().report(&sample_report(), &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["id"], "run-1");
        assert_eq!(value["success"], true);
        assert_eq!(value["decision"]["primary_reason"], "CONFIDENCE_ACHIEVED");
        assert_eq!(value["config"]["minimum_sample_size"], 20);
        assert_eq!(value["warmup"]["outcome"], "stabilized");
        assert_eq!(value["summary"]["mean"], 10.0);
        assert_eq!(value["interval"]["method"], "mean");
        assert_eq!(value["robust_interval"]["method"], "median");
        assert_eq!(value["robust_interval"]["center"], 10.0);
        assert_eq!(value["raw_samples"].as_array().unwrap().len(), 20);
    }

    #[test]
    fn test_infinite_values_become_null() {
        let mut report = sample_report();
        report.warmup.final_cv = f64::INFINITY;

        let mut out = Vec::new();
        JsonReporter::compact().report(&report, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value["warmup"]["final_cv"].is_null());
    }
}
