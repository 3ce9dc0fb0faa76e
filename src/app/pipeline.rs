//! Shared fit workflows used by the CLI commands.
//!
//! job / synthetic sample -> data source -> configure -> recalculate

use std::sync::Arc;

use tracing::info;

use crate::data::{Binning, DataSource, Histogram, HistogramNormalization, NormalSampleSpec, normal_sample};
use crate::domain::{FitOverrides, FitResult, ModelCategory, ModelSpec};
use crate::error::AppError;
use crate::fit::FitSession;
use crate::io::FitJob;

/// Run a fit job to completion.
pub fn run_job(job: FitJob) -> Result<Arc<FitResult>, AppError> {
    let source = job.source.into_data_source()?;
    let mut session = FitSession::new();
    session.configure(source, job.model, job.overrides)?;
    Ok(session.recalculate()?)
}

/// Settings of the synthetic Gaussian demo.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub sample: NormalSampleSpec,
    pub binning: Binning,
    pub normalization: HistogramNormalization,
}

/// Fit a Gaussian distribution to the histogram of a synthetic normal sample.
pub fn run_demo(config: &DemoConfig) -> Result<Arc<FitResult>, AppError> {
    let values = normal_sample(&config.sample)?;
    let histogram = Histogram::from_samples(&values, config.binning, config.normalization)?;
    info!(
        samples = values.len(),
        bins = histogram.bin_count(),
        "built demo histogram"
    );

    let mut session = FitSession::new();
    session.configure(
        DataSource::histogram(histogram),
        ModelSpec::registered(ModelCategory::Distribution, "gaussian"),
        FitOverrides::default(),
    )?;
    Ok(session.recalculate()?)
}
