//! Histograms as fit sources.
//!
//! Bins are uniform over `[min, max]` of the input values; the maximum itself is
//! counted in the last bin. Bin counts for the automatic rules truncate towards
//! zero and are at least 1.

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Upper limit on the number of bins any binning rule may produce.
pub const MAX_BINS: usize = 100_000;

/// Anything that exposes bin centres and bin values.
pub trait BinnedSource: Send + Sync + std::fmt::Debug {
    fn bin_centers(&self) -> Vec<f64>;
    fn bin_values(&self) -> Vec<f64>;
}

/// How the number of bins is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Binning {
    ByNumber { bins: usize },
    ByWidth { width: f64 },
    /// `√n`
    #[default]
    SquareRoot,
    /// `2·∛n`
    Rice,
    /// `1 + log₂ n`
    Sturges,
    /// bin width `3.5·σ/∛n`
    Scott,
}

/// What each bin value measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HistogramNormalization {
    #[default]
    Count,
    Probability,
    CountDensity,
    ProbabilityDensity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    min: f64,
    width: f64,
    counts: Vec<f64>,
    normalization: HistogramNormalization,
}

impl Histogram {
    /// Bin the finite entries of `values`.
    pub fn from_samples(values: &[f64], binning: Binning, normalization: HistogramNormalization) -> Result<Self> {
        let data: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if data.is_empty() {
            return Err(FitError::EmptySource);
        }
        let (min, max) = data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if !(max > min) {
            return Err(FitError::invalid(
                "histogram needs at least two distinct values",
            ));
        }

        let bins = bin_count(&data, min, max, binning)?;
        let width = (max - min) / bins as f64;
        let mut counts = vec![0.0; bins];
        for v in &data {
            let idx = (((v - min) / width) as usize).min(bins - 1);
            counts[idx] += 1.0;
        }

        Ok(Self {
            min,
            width,
            counts,
            normalization,
        })
    }

    pub fn bin_count(&self) -> usize {
        self.counts.len()
    }

    pub fn bin_width(&self) -> f64 {
        self.width
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Raw counts, independent of the normalization.
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn normalization(&self) -> HistogramNormalization {
        self.normalization
    }
}

impl BinnedSource for Histogram {
    fn bin_centers(&self) -> Vec<f64> {
        (0..self.counts.len())
            .map(|i| self.min + (i as f64 + 0.5) * self.width)
            .collect()
    }

    fn bin_values(&self) -> Vec<f64> {
        let total = self.total();
        let scale = match self.normalization {
            HistogramNormalization::Count => 1.0,
            HistogramNormalization::Probability => 1.0 / total,
            HistogramNormalization::CountDensity => 1.0 / self.width,
            HistogramNormalization::ProbabilityDensity => 1.0 / (total * self.width),
        };
        self.counts.iter().map(|c| c * scale).collect()
    }
}

fn bin_count(data: &[f64], min: f64, max: f64, binning: Binning) -> Result<usize> {
    let n = data.len() as f64;
    let range = max - min;
    let raw = match binning {
        Binning::ByNumber { bins: 0 } => return Err(FitError::invalid("number of bins must be positive")),
        Binning::ByNumber { bins } => bins as f64,
        Binning::ByWidth { width } => {
            if !(width.is_finite() && width > 0.0) {
                return Err(FitError::invalid(format!("bin width must be positive, got {width}")));
            }
            range / width
        }
        Binning::SquareRoot => n.sqrt(),
        Binning::Rice => 2.0 * n.cbrt(),
        Binning::Sturges => 1.0 + n.log2(),
        Binning::Scott => {
            let mean = data.iter().sum::<f64>() / n;
            let var = if data.len() > 1 {
                data.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0)
            } else {
                0.0
            };
            let width = 3.5 * var.sqrt() / n.cbrt();
            if width > 0.0 { range / width } else { 1.0 }
        }
    };
    if !(raw <= MAX_BINS as f64) {
        return Err(FitError::invalid(format!("{binning:?} yields {raw} bins, more than {MAX_BINS}")));
    }
    Ok((raw as usize).max(1))
}
