use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use adaptive_bench::source::read_values;
use adaptive_bench::{
    AdaptiveConfig, Cli, Command, Config, Controller, JsonReporter, Preset, ReplaySource,
    Reporter, StatisticalTest, StoppingEngine, SummaryStatistics, WelchTTest,
};
use adaptive_bench_core::stats::OutlierDetector;
use adaptive_bench_core::{ComparisonResult, Evaluation, Recommendation, StoppingDecision};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Initialize tracing. `RUST_LOG` wins, then `--verbose`, then the config file level.
fn init_tracing(verbose: bool, level: Option<&str>) {
    let default_level = if verbose {
        "debug"
    } else {
        level.unwrap_or("warn")
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Serialize)]
struct Analysis<'a> {
    config: &'a AdaptiveConfig,
    evaluation: Evaluation,
    decision: StoppingDecision,
    summary: SummaryStatistics,
}

#[derive(Serialize)]
struct Comparison {
    baseline: SummaryStatistics,
    candidate: SummaryStatistics,
    result: ComparisonResult,
}

#[derive(Serialize)]
struct PresetRecommendation {
    #[serde(flatten)]
    recommendation: Recommendation,
    options: adaptive_bench_core::ConfigOptions,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config and apply CLI overrides
    let mut config = Config::load_from(cli.config.as_deref())?;
    cli.apply_to_config(&mut config);
    init_tracing(cli.verbose, config.logging.level.as_deref());
    debug!(?config, "configuration loaded");

    let reporter = JsonReporter::new();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Command::Analyze { file, elapsed_ms } => {
            let adaptive = config.adaptive_config().context("Invalid configuration")?;
            let samples = load_samples(file)?;
            let engine = StoppingEngine::new(&adaptive);
            let (evaluation, decision) =
                engine.evaluate(&samples, Duration::from_millis(*elapsed_ms));
            let summary = SummaryStatistics::from_samples(evaluation.cleaned_samples());
            let analysis = Analysis {
                config: &adaptive,
                evaluation,
                decision,
                summary,
            };
            reporter.write_value(&analysis, &mut out)?;
        }
        Command::Simulate { file } => {
            let adaptive = config.adaptive_config().context("Invalid configuration")?;
            let mut source = ReplaySource::from_path(file)
                .with_context(|| format!("Failed to load samples from {}", file.display()))?;
            info!(values = source.values().len(), "replaying recorded samples");
            let report = Controller::new(Arc::new(adaptive))
                .run(&mut source)
                .context("Benchmark run failed")?;
            reporter.report(&report, &mut out)?;
        }
        Command::Compare {
            baseline,
            candidate,
        } => {
            let adaptive = config.adaptive_config().context("Invalid configuration")?;
            let detector =
                OutlierDetector::new(adaptive.outlier_estimator(), adaptive.outlier_threshold())
                    .with_handling(adaptive.outlier_handling());
            let baseline = detector.detect(&load_samples(baseline)?).cleaned_samples;
            let candidate = detector.detect(&load_samples(candidate)?).cleaned_samples;
            let result = WelchTTest::new(adaptive.confidence_level()).analyze(&baseline, &candidate);
            let comparison = Comparison {
                baseline: SummaryStatistics::from_samples(&baseline),
                candidate: SummaryStatistics::from_samples(&candidate),
                result,
            };
            reporter.write_value(&comparison, &mut out)?;
        }
        Command::Presets => {
            for preset in Preset::ALL {
                writeln!(
                    out,
                    "# {}: {} (typically {})",
                    preset,
                    preset.use_case(),
                    preset.estimated_duration()
                )?;
                writeln!(out, "{}", toml::to_string(&preset.options())?)?;
            }
        }
        Command::Recommend {
            accuracy,
            time_constraint,
            production,
        } => {
            let recommendation = Preset::recommend(*accuracy, *time_constraint, *production);
            let options = recommendation.preset.options();
            reporter.write_value(
                &PresetRecommendation {
                    recommendation,
                    options,
                },
                &mut out,
            )?;
        }
    }

    out.flush()?;
    Ok(())
}

fn load_samples(path: &Path) -> Result<Vec<f64>> {
    read_values(path).with_context(|| format!("Failed to load samples from {}", path.display()))
}
