//! Measurement sources: anything that performs one timed trial per call.

use std::fmt::Display;
use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Measurement failed: {0}")]
    Failed(String),
    #[error("Invalid measurement: {0} (expected a finite, non-negative duration)")]
    InvalidMeasurement(f64),
    #[error("Failed to read measurements from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse measurement '{0}'")]
    Parse(String),
    #[error("No measurements to replay")]
    Empty,
}

/// Performs one timed trial and returns its duration in milliseconds.
///
/// The controller calls this repeatedly and synchronously. A call that can
/// block indefinitely must enforce its own timeout.
pub trait MeasurementSource {
    fn measure(&mut self) -> Result<f64, SourceError>;
}

impl<S: MeasurementSource + ?Sized> MeasurementSource for &mut S {
    fn measure(&mut self) -> Result<f64, SourceError> {
        (**self).measure()
    }
}

impl<S: MeasurementSource + ?Sized> MeasurementSource for Box<S> {
    fn measure(&mut self) -> Result<f64, SourceError> {
        (**self).measure()
    }
}

/// Source backed by a closure that reports durations itself.
pub struct FnSource<F> {
    f: F,
}

pub fn from_fn<F>(f: F) -> FnSource<F>
where
    F: FnMut() -> Result<f64, SourceError>,
{
    FnSource { f }
}

impl<F> MeasurementSource for FnSource<F>
where
    F: FnMut() -> Result<f64, SourceError>,
{
    fn measure(&mut self) -> Result<f64, SourceError> {
        (self.f)()
    }
}

/// Source that times a workload with the wall clock.
pub struct Timed<F> {
    workload: F,
}

pub fn timed<F, E>(workload: F) -> Timed<F>
where
    F: FnMut() -> Result<(), E>,
    E: Display,
{
    Timed { workload }
}

impl<F, E> MeasurementSource for Timed<F>
where
    F: FnMut() -> Result<(), E>,
    E: Display,
{
    fn measure(&mut self) -> Result<f64, SourceError> {
        let start = Instant::now();
        (self.workload)().map_err(|e| SourceError::Failed(e.to_string()))?;
        Ok(start.elapsed().as_secs_f64() * 1_000.0)
    }
}

/// Measure once, treating negative or non-finite durations as failures.
pub fn measure_checked<S: MeasurementSource + ?Sized>(source: &mut S) -> Result<f64, SourceError> {
    let value = source.measure()?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SourceError::InvalidMeasurement(value))
    }
}

mod replay;
pub use replay::{parse_values, read_values, ReplaySource};
