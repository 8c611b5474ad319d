//! End-to-end runs of the controller against synthetic sources.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use adaptive_bench::{
    from_fn, AdaptiveConfig, Config, ConfigOptions, Controller, ControllerError, JsonReporter,
    Phase, Preset, ReplaySource, Reporter, SourceError, StopReason, WarmupOutcome,
};
use tempfile::NamedTempFile;

fn quick() -> Arc<AdaptiveConfig> {
    Arc::new(AdaptiveConfig::from_preset(Preset::Quick).unwrap())
}

fn alternating() -> impl FnMut() -> Result<f64, SourceError> {
    let mut i = 0u64;
    move || {
        i += 1;
        Ok(if i % 2 == 0 { 1.0 } else { 1_000.0 })
    }
}

/// A noise-free source is done as soon as the minimum sample count is reached.
#[test]
fn test_constant_source_quick_preset() {
    let mut calls = 0;
    let mut source = from_fn(|| {
        calls += 1;
        Ok(10.0)
    });

    let report = Controller::new(quick()).run(&mut source).unwrap();
    drop(source);

    assert!(report.success);
    assert!(report.warmup.completed);
    assert_eq!(report.warmup.iterations, 5);
    assert_eq!(report.raw_count, 20);
    assert_eq!(report.cleaned_count, 20);
    assert_eq!(calls, 25);

    assert_eq!(report.reason(), Some(StopReason::ConfidenceAchieved));
    assert!(report.decision.contributing_reasons.len() >= 2);
    assert_eq!(report.summary.mean, 10.0);
    assert_eq!(report.summary.std_dev, 0.0);
    assert_eq!(report.interval.width, 0.0);
    assert!(report.stability.is_stable);
}

/// A bimodal source never settles and runs into the sample ceiling.
#[test]
fn test_alternating_source_reaches_max_samples() {
    let config = quick();
    let mut source = from_fn(alternating());

    let report = Controller::new(config.clone()).run(&mut source).unwrap();

    assert!(!report.success);
    assert_eq!(report.warmup.outcome, WarmupOutcome::MaxIterations);
    assert_eq!(report.raw_count, config.maximum_sample_size());
    assert_eq!(report.reason(), Some(StopReason::MaximumSamplesReached));
    assert_eq!(
        report.decision.contributing_reasons.first(),
        Some(&StopReason::MaximumSamplesReached)
    );
    assert!(!report.stability.is_stable);
    assert!(report.decision.explanation.contains("Maximum sample size"));
}

/// Even convergence blocks see identical means for a bimodal source; the
/// spread inside each block still keeps the run from counting as converged.
#[test]
fn test_alternating_source_never_converges_under_larger_presets() {
    for (preset, ceiling) in [(Preset::Default, 400), (Preset::HighPrecision, 600)] {
        let config = Arc::new(
            AdaptiveConfig::new(ConfigOptions {
                maximum_sample_size: ceiling,
                ..preset.options()
            })
            .unwrap(),
        );
        let mut source = from_fn(alternating());

        let report = Controller::new(config).run(&mut source).unwrap();

        assert!(!report.success, "{}", preset);
        assert_eq!(report.raw_count, ceiling, "{}", preset);
        assert_eq!(report.reason(), Some(StopReason::MaximumSamplesReached));
        assert!(!report.stability.has_converged, "{}", preset);
        assert!(!report.stability.is_stable, "{}", preset);
        assert!(!report
            .decision
            .contributing_reasons
            .contains(&StopReason::ConvergenceDetected));
    }
}

/// A timer that mostly reads one tick keeps its minority reads.
#[test]
fn test_quantized_source_keeps_every_sample() {
    let mut i = 0u64;
    let mut source = from_fn(move || {
        i += 1;
        Ok(if i % 10 < 7 { 10.0 } else { 11.0 })
    });

    let report = Controller::new(quick()).run(&mut source).unwrap();

    assert_eq!(report.outliers.outlier_count, 0);
    assert_eq!(report.cleaned_count, report.raw_count);
    assert!(report.interval.width > 0.0);
    assert!(report.summary.mean > 10.2 && report.summary.mean < 10.4);
}

#[test]
fn test_always_failing_source_aborts_in_warmup() {
    let config = quick();
    let mut calls = 0;
    let mut source = from_fn(|| {
        calls += 1;
        Err(SourceError::Failed("connection refused".to_string()))
    });

    let result = Controller::new(config.clone()).run(&mut source);
    drop(source);

    match result {
        Err(ControllerError::TooManyFailures {
            phase,
            failures,
            window,
            ..
        }) => {
            assert_eq!(phase, Phase::Warmup);
            assert_eq!(window, config.failure_window());
            assert_eq!(failures, window);
        }
        other => panic!("expected TooManyFailures, got {:?}", other.map(|r| r.id)),
    }
    assert_eq!(calls, config.failure_window());
}

/// Occasional failures are skipped and do not count toward the sample budget.
#[test]
fn test_intermittent_failures_are_skipped() {
    let mut calls = 0u32;
    let mut source = from_fn(|| {
        calls += 1;
        if calls % 4 == 0 {
            Err(SourceError::Failed("flaky".to_string()))
        } else {
            Ok(5.0)
        }
    });

    let report = Controller::new(quick()).run(&mut source).unwrap();

    assert!(report.success);
    assert_eq!(report.raw_count, 20);
    assert_eq!(report.warmup.failures, 1);
    assert!(report.failed_invocations > 0);
    assert!(report.raw_samples.iter().all(|&v| v == 5.0));
}

/// Negative and non-finite durations are treated as failed invocations.
#[test]
fn test_invalid_measurements_are_failures() {
    let mut calls = 0u32;
    let mut source = from_fn(|| {
        calls += 1;
        Ok(match calls % 5 {
            0 => f64::NAN,
            3 => -1.0,
            _ => 7.0,
        })
    });

    let report = Controller::new(quick()).run(&mut source).unwrap();

    assert!(report.success);
    assert!(report.raw_samples.iter().all(|&v| v == 7.0));
    assert!(report.failed_invocations > 0);
}

#[test]
fn test_cancellation_mid_run() {
    let flag = Arc::new(AtomicBool::new(false));
    let setter = flag.clone();
    let mut next = alternating();
    let mut calls = 0;
    // 100 warmup iterations, then 30 samples.
    let mut source = from_fn(move || {
        calls += 1;
        if calls == 130 {
            setter.store(true, Ordering::Relaxed);
        }
        next()
    });

    let report = Controller::new(quick())
        .with_cancellation(flag)
        .run(&mut source)
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.raw_count, 30);
    assert_eq!(report.reason(), Some(StopReason::UserRequested));
    assert!(report.decision.should_stop);
}

/// The sampling budget is checked before every invocation.
#[test]
fn test_time_limit() {
    let options = ConfigOptions {
        max_benchmark_duration_ms: 0,
        ..Preset::Quick.options()
    };
    // Zero is rejected, so use the smallest budget there is.
    assert!(AdaptiveConfig::new(options.clone()).is_err());

    let options = ConfigOptions {
        max_benchmark_duration_ms: 1,
        ..options
    };
    let config = Arc::new(AdaptiveConfig::new(options).unwrap());
    let mut i = 0u32;
    let mut source = from_fn(|| {
        i += 1;
        std::thread::sleep(std::time::Duration::from_millis(2));
        Ok(if i % 2 == 0 { 1.0 } else { 50.0 })
    });

    let report = Controller::new(config).run(&mut source).unwrap();

    assert!(!report.success);
    assert_eq!(report.reason(), Some(StopReason::TimeLimitReached));
    assert!(report.raw_count < 20);
}

#[test]
fn test_replay_file_end_to_end() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[10.0, 10.2, 9.8, 10.1, 9.9]").unwrap();

    let mut config = Config::default();
    config.benchmark.preset = Preset::Quick;
    let adaptive = Arc::new(config.adaptive_config().unwrap());

    let mut source = ReplaySource::from_path(file.path()).unwrap();
    let report = Controller::new(adaptive).run(&mut source).unwrap();

    assert!(report.success);
    assert_eq!(report.raw_count, 20);
    assert!((report.summary.mean - 10.0).abs() < 0.05);
    assert_eq!(report.outliers.outlier_count, 0);

    let mut out = Vec::new();
    JsonReporter::new().report(&report, &mut out).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["raw_count"], 20);
    assert_eq!(json["decision"]["primary_reason"], "CONFIDENCE_ACHIEVED");
    assert_eq!(json["id"].as_str().map(str::len), Some(36));
}
