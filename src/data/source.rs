//! Column abstraction and sample extraction.
//!
//! A fit never reads host data directly. It asks a [`DataSource`] for a fresh
//! [`SampleSet`] on every recalculation, so columns may keep changing between
//! fits without the session having to be reconfigured.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::histogram::BinnedSource;
use crate::domain::SampleSet;
use crate::error::{FitError, Result};

/// Read-only numeric column.
///
/// `value_at` returns `None` for a missing cell or a row out of range.
pub trait Column: Send + Sync + std::fmt::Debug {
    fn row_count(&self) -> usize;
    fn value_at(&self, row: usize) -> Option<f64>;

    /// All rows at once. Implementations behind a lock override this so one
    /// extraction sees a consistent snapshot.
    fn snapshot(&self) -> Vec<Option<f64>> {
        (0..self.row_count()).map(|row| self.value_at(row)).collect()
    }
}

impl Column for Vec<f64> {
    fn row_count(&self) -> usize {
        self.len()
    }

    fn value_at(&self, row: usize) -> Option<f64> {
        self.get(row).copied().filter(|v| !v.is_nan())
    }
}

/// A named column shared between the host and fit sessions.
///
/// NaN marks a missing cell. The vector is behind an `RwLock`; a poisoned lock
/// is recovered since a `Vec<f64>` cannot be left half-updated by a panic.
#[derive(Debug, Clone)]
pub struct SharedColumn {
    name: Arc<str>,
    data: Arc<RwLock<Vec<f64>>>,
}

impl SharedColumn {
    pub fn new(name: &str) -> Self {
        Self::from_values(name, Vec::new())
    }

    pub fn from_values(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: Arc::from(name),
            data: Arc::new(RwLock::new(values)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the whole column.
    pub fn set(&self, values: Vec<f64>) {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = values;
    }

    pub fn set_value(&self, row: usize, value: f64) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        if row >= data.len() {
            data.resize(row + 1, f64::NAN);
        }
        data[row] = value;
    }

    /// Copy of the raw values (NaN for missing cells).
    pub fn values(&self) -> Vec<f64> {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Column for SharedColumn {
    fn row_count(&self) -> usize {
        self.len()
    }

    fn value_at(&self, row: usize) -> Option<f64> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.get(row).copied().filter(|v| !v.is_nan())
    }

    fn snapshot(&self) -> Vec<Option<f64>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.iter().map(|&v| (!v.is_nan()).then_some(v)).collect()
    }
}

/// How per-sample weights are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WeightKind {
    /// All weights 1.
    #[default]
    None,
    /// `1 / err²` from the y-error column.
    Instrumental,
    /// The y-error column used as weight.
    Direct,
    /// `1 / err`.
    Inverse,
    /// `1 / y` (Poisson counts).
    Statistical,
    /// `1 / y²`.
    Relative,
}

impl WeightKind {
    pub fn needs_error_column(self) -> bool {
        matches!(self, WeightKind::Instrumental | WeightKind::Direct | WeightKind::Inverse)
    }

    fn weight(self, y: f64, err: Option<f64>) -> Option<f64> {
        match self {
            WeightKind::None => Some(1.0),
            WeightKind::Instrumental => err.map(|e| 1.0 / (e * e)),
            WeightKind::Direct => err,
            WeightKind::Inverse => err.map(|e| 1.0 / e),
            WeightKind::Statistical => Some(1.0 / y),
            WeightKind::Relative => Some(1.0 / (y * y)),
        }
    }
}

/// Where a fit takes its samples from.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// Paired x/y columns with an optional y-error column.
    Curve {
        x: Arc<dyn Column>,
        y: Arc<dyn Column>,
        y_error: Option<Arc<dyn Column>>,
        weights: WeightKind,
    },
    /// Bin centres and bin values of a histogram.
    Histogram {
        source: Arc<dyn BinnedSource>,
        weights: WeightKind,
    },
}

impl DataSource {
    pub fn curve(x: impl Column + 'static, y: impl Column + 'static) -> Self {
        DataSource::Curve {
            x: Arc::new(x),
            y: Arc::new(y),
            y_error: None,
            weights: WeightKind::None,
        }
    }

    pub fn histogram(source: impl BinnedSource + 'static) -> Self {
        DataSource::Histogram {
            source: Arc::new(source),
            weights: WeightKind::None,
        }
    }

    /// Attach a y-error column. Ignored for histogram sources.
    pub fn with_y_error(mut self, column: impl Column + 'static) -> Self {
        if let DataSource::Curve { y_error, .. } = &mut self {
            *y_error = Some(Arc::new(column));
        }
        self
    }

    pub fn with_weights(mut self, kind: WeightKind) -> Self {
        match &mut self {
            DataSource::Curve { weights, .. } | DataSource::Histogram { weights, .. } => *weights = kind,
        }
        self
    }

    pub fn weight_kind(&self) -> WeightKind {
        match self {
            DataSource::Curve { weights, .. } | DataSource::Histogram { weights, .. } => *weights,
        }
    }

    /// Configuration-time checks that do not depend on the current data.
    pub fn validate(&self) -> Result<()> {
        let kind = self.weight_kind();
        let has_errors = matches!(self, DataSource::Curve { y_error: Some(_), .. });
        if kind.needs_error_column() && !has_errors {
            return Err(FitError::invalid(format!(
                "weighting '{kind:?}' requires a y-error column"
            )));
        }
        Ok(())
    }

    /// Pull a fresh sample set.
    ///
    /// Rows with a missing or non-finite x or y are skipped, as are rows whose
    /// weight comes out non-finite or negative. Fails with `EmptySource` when no
    /// row survives.
    pub fn extract(&self) -> Result<SampleSet> {
        self.extract_in(None)
    }

    /// Like [`extract`](Self::extract), keeping only rows with
    /// `lo <= x <= hi` when a fit range is given.
    pub fn extract_in(&self, fit_range: Option<(f64, f64)>) -> Result<SampleSet> {
        self.validate()?;
        let kind = self.weight_kind();

        let (xs, ys, errs): (Vec<Option<f64>>, Vec<Option<f64>>, Option<Vec<Option<f64>>>) = match self {
            DataSource::Curve { x, y, y_error, .. } => {
                (x.snapshot(), y.snapshot(), y_error.as_ref().map(|c| c.snapshot()))
            }
            DataSource::Histogram { source, .. } => {
                let centres = source.bin_centers().into_iter().map(Some).collect();
                let values = source.bin_values().into_iter().map(Some).collect();
                (centres, values, None)
            }
        };

        let rows = xs.len().min(ys.len());
        let mut x_out = Vec::with_capacity(rows);
        let mut y_out = Vec::with_capacity(rows);
        let mut w_out = Vec::with_capacity(rows);
        let mut missing = 0usize;
        let mut bad_weight = 0usize;
        let mut outside = 0usize;

        for row in 0..rows {
            let (Some(x), Some(y)) = (xs[row], ys[row]) else {
                missing += 1;
                continue;
            };
            if !(x.is_finite() && y.is_finite()) {
                missing += 1;
                continue;
            }
            if fit_range.is_some_and(|(lo, hi)| x < lo || x > hi) {
                outside += 1;
                continue;
            }
            let err = errs.as_ref().and_then(|e| e.get(row).copied().flatten());
            match kind.weight(y, err) {
                Some(w) if w.is_finite() && w >= 0.0 => {
                    x_out.push(x);
                    y_out.push(y);
                    w_out.push(w);
                }
                _ => bad_weight += 1,
            }
        }

        if missing > 0 {
            warn!(rows = missing, "skipped rows with missing or non-finite values");
        }
        if bad_weight > 0 {
            warn!(rows = bad_weight, weighting = ?kind, "skipped rows with invalid weights");
        }
        if outside > 0 {
            debug!(rows = outside, "rows outside the fit range");
        }
        if x_out.is_empty() {
            return Err(FitError::EmptySource);
        }

        let weights = (kind != WeightKind::None).then_some(w_out);
        SampleSet::new(x_out, y_out, weights)
    }
}
