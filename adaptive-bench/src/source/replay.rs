use std::path::Path;

use super::{MeasurementSource, SourceError};

/// Replays recorded durations in order, wrapping around at the end.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    values: Vec<f64>,
    position: usize,
}

impl ReplaySource {
    pub fn new(values: Vec<f64>) -> Result<Self, SourceError> {
        if values.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(Self {
            values,
            position: 0,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        Self::new(read_values(path)?)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl MeasurementSource for ReplaySource {
    fn measure(&mut self) -> Result<f64, SourceError> {
        let value = self.values[self.position];
        self.position = (self.position + 1) % self.values.len();
        Ok(value)
    }
}

/// Read durations from a file holding a JSON array or whitespace/comma separated numbers.
pub fn read_values(path: &Path) -> Result<Vec<f64>, SourceError> {
    let content = std::fs::read_to_string(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_values(&content)
}

pub fn parse_values(content: &str) -> Result<Vec<f64>, SourceError> {
    let trimmed = content.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| SourceError::Parse(e.to_string()));
    }
    trimmed
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| SourceError::Parse(token.to_string()))
        })
        .collect()
}
