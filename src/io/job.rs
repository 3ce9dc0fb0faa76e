//! Fit job files.
//!
//! A job is one self-contained fit request in JSON:
//!
//! ```json
//! {
//!   "source": { "kind": "curve", "x": [0, 1, 2, 3], "y": [2, 4, 6, null] },
//!   "model": { "kind": "custom", "expression": "B0 + B1*x", "parameters": ["B0", "B1"] },
//!   "overrides": { "parameters": { "B0": { "start": 1.0 } } }
//! }
//! ```
//!
//! `null` cells are missing values. Histogram sources carry the raw values and
//! are binned when the job is turned into a [`DataSource`].

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::{Binning, DataSource, Histogram, HistogramNormalization, WeightKind};
use crate::domain::{FitOverrides, ModelSpec};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitJob {
    pub source: JobSource,
    pub model: ModelSpec,
    #[serde(default)]
    pub overrides: FitOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSource {
    Curve {
        x: Vec<Option<f64>>,
        y: Vec<Option<f64>>,
        #[serde(default)]
        y_error: Option<Vec<Option<f64>>>,
        #[serde(default)]
        weights: WeightKind,
    },
    Histogram {
        values: Vec<f64>,
        #[serde(default)]
        binning: Binning,
        #[serde(default)]
        normalization: HistogramNormalization,
        #[serde(default)]
        weights: WeightKind,
    },
}

fn column(cells: Vec<Option<f64>>) -> Vec<f64> {
    cells.into_iter().map(|c| c.unwrap_or(f64::NAN)).collect()
}

impl JobSource {
    pub fn into_data_source(self) -> Result<DataSource> {
        let source = match self {
            JobSource::Curve {
                x,
                y,
                y_error,
                weights,
            } => {
                let mut source = DataSource::curve(column(x), column(y)).with_weights(weights);
                if let Some(err) = y_error {
                    source = source.with_y_error(column(err));
                }
                source
            }
            JobSource::Histogram {
                values,
                binning,
                normalization,
                weights,
            } => DataSource::histogram(Histogram::from_samples(&values, binning, normalization)?).with_weights(weights),
        };
        Ok(source)
    }
}

/// Read a job file.
pub fn read_job(path: &Path) -> std::result::Result<FitJob, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open job file '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid job file '{}': {e}", path.display())))
}
