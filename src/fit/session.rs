//! Fit sessions: configuration, recalculation and result publication.
//!
//! A [`FitSession`] owns one fit configuration and the latest result. Results are
//! immutable `Arc<FitResult>` snapshots: a recalculation builds a complete new
//! result and swaps it in, so readers never observe a half-written fit.

use std::sync::{Arc, Mutex, RwLock, TryLockError};

use serde::Serialize;
use tracing::{info, warn};

use crate::data::{DataSource, SharedColumn};
use crate::domain::{FitOverrides, FitResult, ModelSpec, OutputDomain, OutputSeries, Parameter, SampleSet};
use crate::error::{FitError, Result};
use crate::fit::solver::{CancelToken, solve};
use crate::models::{ModelDefinition, registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unconfigured,
    Ready,
    Solving,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
struct Configuration {
    source: DataSource,
    model: ModelDefinition,
    overrides: FitOverrides,
}

#[derive(Debug)]
pub struct FitSession {
    config: Option<Configuration>,
    state: SessionState,
    result: Option<Arc<FitResult>>,
    /// Fitted values carried into the next recalculation.
    carried: Option<Vec<f64>>,
    output: Option<(SharedColumn, SharedColumn)>,
}

impl Default for FitSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FitSession {
    pub fn new() -> Self {
        Self {
            config: None,
            state: SessionState::Unconfigured,
            result: None,
            carried: None,
            output: None,
        }
    }

    /// Write every new output series into `x` / `y`.
    pub fn with_output(mut self, x: SharedColumn, y: SharedColumn) -> Self {
        self.output = Some((x, y));
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The latest published result, if any.
    pub fn result(&self) -> Option<Arc<FitResult>> {
        self.result.clone()
    }

    pub fn model(&self) -> Option<&ModelDefinition> {
        self.config.as_ref().map(|c| &c.model)
    }

    /// Resolve and validate a new configuration.
    ///
    /// On error the previous configuration and state are kept.
    pub fn configure(&mut self, source: DataSource, model: ModelSpec, overrides: FitOverrides) -> Result<()> {
        source.validate()?;
        let model = registry().resolve_spec(&model)?;
        validate_overrides(&model, &overrides)?;

        info!(
            category = %model.category(),
            model = model.name(),
            parameters = model.parameter_count(),
            "fit configured"
        );
        self.config = Some(Configuration {
            source,
            model,
            overrides,
        });
        self.carried = None;
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Pull fresh samples, solve and publish a new result.
    pub fn recalculate(&mut self) -> Result<Arc<FitResult>> {
        self.recalculate_with(None)
    }

    pub(crate) fn recalculate_with(&mut self, cancel: Option<&CancelToken>) -> Result<Arc<FitResult>> {
        let config = self.config.as_ref().ok_or(FitError::NotConfigured)?;
        self.state = SessionState::Solving;

        let outcome = run_fit(config, self.carried.as_deref(), cancel);
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "recalculation failed; previous result kept");
                self.state = SessionState::Failed;
                return Err(err);
            }
        };

        if let Some((x, y)) = &self.output {
            x.set(result.output.x.clone());
            y.set(result.output.y.clone());
        }

        let succeeded = result.status.is_success();
        if succeeded && config.overrides.use_results_as_start {
            self.carried = Some(result.values());
        }
        info!(
            status = %result.status,
            iterations = result.iterations,
            ssr = result.ssr,
            "fit finished"
        );

        let result = Arc::new(result);
        self.result = Some(Arc::clone(&result));
        self.state = if succeeded {
            SessionState::Succeeded
        } else {
            SessionState::Failed
        };
        Ok(result)
    }
}

fn validate_overrides(model: &ModelDefinition, overrides: &FitOverrides) -> Result<()> {
    overrides.solver.validate()?;
    for (name, o) in &overrides.parameters {
        if !model.parameter_names().iter().any(|p| p == name) {
            return Err(FitError::invalid(format!(
                "model '{}' has no parameter '{name}'",
                model.name()
            )));
        }
        if let (Some(lo), Some(hi)) = (o.lower, o.upper) {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(FitError::invalid(format!(
                    "parameter '{name}': lower bound {lo} exceeds upper bound {hi}"
                )));
            }
        }
        if o.start.is_some_and(|s| !s.is_finite()) {
            return Err(FitError::invalid(format!("parameter '{name}': start value must be finite")));
        }
        if o.fixed && o.start.is_none() {
            warn!(parameter = %name, "fixed parameter without start value uses the estimated one");
        }
    }
    if let Some((lo, hi)) = overrides.fit_range {
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
            return Err(FitError::invalid(format!("invalid fit range [{lo}, {hi}]")));
        }
    }
    if let OutputDomain::Grid { points, range } = &overrides.output {
        if points.is_some_and(|n| n < 2) {
            return Err(FitError::invalid("output grid needs at least 2 points"));
        }
        if let Some((lo, hi)) = range {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(FitError::invalid(format!("invalid output range [{lo}, {hi}]")));
            }
        }
    }
    Ok(())
}

fn run_fit(config: &Configuration, carried: Option<&[f64]>, cancel: Option<&CancelToken>) -> Result<FitResult> {
    let samples = config.source.extract_in(config.overrides.fit_range)?;
    let start = start_parameters(&config.model, &samples, &config.overrides, carried)?;
    info!(samples = samples.len(), "recalculating fit");

    let mut result = solve(&config.model, &start, &samples, &config.overrides.solver, cancel);
    result.output = output_series(&config.model, &result.values(), &samples, &config.overrides.output);
    Ok(result)
}

/// Estimated start values, then carried values, then user overrides.
///
/// Carried values win over explicit start values; bounds and fixed flags always
/// come from the overrides.
fn start_parameters(
    model: &ModelDefinition,
    samples: &SampleSet,
    overrides: &FitOverrides,
    carried: Option<&[f64]>,
) -> Result<Vec<Parameter>> {
    let estimated = registry().estimate_start_values(model, samples);
    estimated
        .into_iter()
        .enumerate()
        .map(|(i, mut p)| {
            let o = overrides.parameters.get(&p.name);
            match (carried.and_then(|c| c.get(i)), o.and_then(|o| o.start)) {
                (Some(&value), _) | (None, Some(value)) => p.value = value,
                (None, None) => {}
            }
            if let Some(o) = o {
                p.lower = o.lower.unwrap_or(p.lower);
                p.upper = o.upper.unwrap_or(p.upper);
                if o.fixed {
                    p = p.fixed();
                }
            }
            p.validate()?;
            Ok(p)
        })
        .collect()
}

fn output_series(model: &ModelDefinition, values: &[f64], samples: &SampleSet, domain: &OutputDomain) -> OutputSeries {
    let x = match domain {
        OutputDomain::InputX => samples.x().to_vec(),
        OutputDomain::Grid { points, range } => {
            let n = points.unwrap_or(samples.len()).max(2);
            let (lo, hi) = range.unwrap_or_else(|| samples.x_range());
            let step = (hi - lo) / (n - 1) as f64;
            (0..n).map(|i| lo + i as f64 * step).collect()
        }
    };
    let y = model.evaluate_all(&x, values);
    OutputSeries { x, y }
}

/// A fit session shared between threads.
///
/// Solves are serialized: a second `recalculate` blocks until the first has
/// finished. The latest result stays readable through [`latest`](Self::latest)
/// while a solve is in flight.
#[derive(Debug, Clone)]
pub struct SharedFitSession {
    inner: Arc<SharedInner>,
}

#[derive(Debug)]
struct SharedInner {
    session: Mutex<FitSession>,
    latest: RwLock<Option<Arc<FitResult>>>,
    cancel: CancelToken,
}

impl SharedFitSession {
    pub fn new(session: FitSession) -> Self {
        let latest = session.result();
        Self {
            inner: Arc::new(SharedInner {
                session: Mutex::new(session),
                latest: RwLock::new(latest),
                cancel: CancelToken::new(),
            }),
        }
    }

    pub fn configure(&self, source: DataSource, model: ModelSpec, overrides: FitOverrides) -> Result<()> {
        let mut session = self.inner.session.lock().map_err(|_| FitError::Poisoned)?;
        session.configure(source, model, overrides)
    }

    pub fn recalculate(&self) -> Result<Arc<FitResult>> {
        let mut session = self.inner.session.lock().map_err(|_| FitError::Poisoned)?;
        self.inner.cancel.reset();
        let result = session.recalculate_with(Some(&self.inner.cancel))?;
        *self.inner.latest.write().map_err(|_| FitError::Poisoned)? = Some(Arc::clone(&result));
        Ok(result)
    }

    /// Latest published result. Does not wait for an in-flight solve.
    pub fn latest(&self) -> Result<Option<Arc<FitResult>>> {
        Ok(self.inner.latest.read().map_err(|_| FitError::Poisoned)?.clone())
    }

    /// `Solving` while another thread holds the session.
    pub fn state(&self) -> Result<SessionState> {
        match self.inner.session.try_lock() {
            Ok(session) => Ok(session.state()),
            Err(TryLockError::WouldBlock) => Ok(SessionState::Solving),
            Err(TryLockError::Poisoned(_)) => Err(FitError::Poisoned),
        }
    }

    /// Ask the in-flight solve to stop at its next iteration.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitStatus, ModelCategory};
    use approx::assert_abs_diff_eq;

    fn linear_source() -> (SharedColumn, SharedColumn, DataSource) {
        let x = SharedColumn::from_values("x", vec![0.0, 1.0, 2.0, 3.0]);
        let y = SharedColumn::from_values("y", vec![2.0, 4.0, 6.0, 8.0]);
        let source = DataSource::curve(x.clone(), y.clone());
        (x, y, source)
    }

    fn line() -> ModelSpec {
        ModelSpec::custom("B0 + B1*x", &["B0", "B1"])
    }

    #[test]
    fn recalculate_before_configure() {
        let mut session = FitSession::new();
        assert_eq!(session.state(), SessionState::Unconfigured);
        assert_eq!(session.recalculate().unwrap_err(), FitError::NotConfigured);
        assert_eq!(session.state(), SessionState::Unconfigured);
    }

    #[test]
    fn state_transitions_and_output_columns() {
        let (_, _, source) = linear_source();
        let out_x = SharedColumn::new("fit x");
        let out_y = SharedColumn::new("fit y");
        let mut session = FitSession::new().with_output(out_x.clone(), out_y.clone());

        session.configure(source, line(), FitOverrides::default()).unwrap();
        assert_eq!(session.state(), SessionState::Ready);

        let result = session.recalculate().unwrap();
        assert_eq!(session.state(), SessionState::Succeeded);
        assert_eq!(result.status, FitStatus::Converged);
        assert_eq!(out_x.values(), vec![0.0, 1.0, 2.0, 3.0]);
        for (got, want) in out_y.values().iter().zip([2.0, 4.0, 6.0, 8.0]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-6);
        }
        assert!(Arc::ptr_eq(&result, &session.result().unwrap()));
    }

    #[test]
    fn empty_source_keeps_previous_result() {
        let (x, _, source) = linear_source();
        let mut session = FitSession::new();
        session.configure(source, line(), FitOverrides::default()).unwrap();
        let first = session.recalculate().unwrap();

        x.set(vec![f64::NAN; 4]);
        assert_eq!(session.recalculate().unwrap_err(), FitError::EmptySource);
        assert_eq!(session.state(), SessionState::Failed);
        assert!(Arc::ptr_eq(&first, &session.result().unwrap()));
    }

    #[test]
    fn configure_errors_surface_immediately() {
        let (_, _, source) = linear_source();
        let mut session = FitSession::new();
        let err = session
            .configure(
                source.clone(),
                ModelSpec::custom("B0 + B1*x + B2*x^2 + B3*x^3", &["B0", "B1", "B2"]),
                FitOverrides::default(),
            )
            .unwrap_err();
        assert_eq!(err, FitError::UnknownIdentifier("B3".to_string()));
        assert_eq!(session.state(), SessionState::Unconfigured);

        let unknown = FitOverrides::builder().start("nope", 1.0).build();
        assert!(matches!(
            session.configure(source.clone(), line(), unknown),
            Err(FitError::InvalidConfig(_))
        ));

        let inverted = FitOverrides::builder().bounds("B0", 1.0, 0.0).build();
        assert!(matches!(
            session.configure(source.clone(), line(), inverted),
            Err(FitError::InvalidConfig(_))
        ));

        let reversed_range = FitOverrides::builder().fit_range(3.0, 1.0).build();
        assert!(matches!(
            session.configure(source.clone(), line(), reversed_range),
            Err(FitError::InvalidConfig(_))
        ));

        assert!(matches!(
            session.configure(source, ModelSpec::registered(ModelCategory::Peak, "triangle"), FitOverrides::default()),
            Err(FitError::UnknownModel { .. })
        ));
    }

    #[test]
    fn fixed_override_and_grid_output() {
        let (_, _, source) = linear_source();
        let overrides = FitOverrides::builder()
            .fix("B0", 0.0)
            .output(OutputDomain::Grid {
                points: Some(5),
                range: Some((0.0, 4.0)),
            })
            .build();
        let mut session = FitSession::new();
        session.configure(source, line(), overrides).unwrap();
        let result = session.recalculate().unwrap();

        let b0 = result.parameter("B0").unwrap();
        assert!(b0.fixed);
        assert_eq!(b0.value, 0.0);
        assert_eq!(result.output.x, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_abs_diff_eq!(result.output.y[4], 4.0 * 40.0 / 14.0, epsilon = 1e-6);
    }

    #[test]
    fn rows_outside_fit_range_are_ignored() {
        let x = SharedColumn::from_values("x", vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let y = SharedColumn::from_values("y", vec![2.0, 4.0, 6.0, 8.0, 100.0, -50.0]);
        let overrides = FitOverrides::builder().fit_range(0.0, 3.0).build();
        let mut session = FitSession::new();
        session.configure(DataSource::curve(x, y), line(), overrides).unwrap();
        let result = session.recalculate().unwrap();

        assert_eq!(result.residuals.len(), 4);
        assert_eq!(result.output.x, vec![0.0, 1.0, 2.0, 3.0]);
        assert_abs_diff_eq!(result.parameter("B0").unwrap().value, 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(result.parameter("B1").unwrap().value, 2.0, epsilon = 1e-6);

        let (_, _, source) = linear_source();
        let beyond = FitOverrides::builder().fit_range(10.0, 20.0).build();
        session.configure(source, line(), beyond).unwrap();
        assert_eq!(session.recalculate().unwrap_err(), FitError::EmptySource);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn results_feed_the_next_start() {
        let (_, y, source) = linear_source();
        let overrides = FitOverrides::builder().use_results_as_start(true).build();
        let mut session = FitSession::new();
        session.configure(source, line(), overrides).unwrap();
        session.recalculate().unwrap();

        // Unchanged data starting at the optimum needs (almost) no work.
        y.set(vec![2.0, 4.0, 6.0, 8.0]);
        let second = session.recalculate().unwrap();
        assert!(second.iterations <= 2, "iterations = {}", second.iterations);
        assert_abs_diff_eq!(second.parameters[1].value, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn shared_session_serializes_solves() {
        let (_, _, source) = linear_source();
        let shared = SharedFitSession::new(FitSession::new());
        assert!(shared.latest().unwrap().is_none());
        shared.configure(source, line(), FitOverrides::default()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || shared.recalculate())
            })
            .collect();
        for handle in handles {
            let result = handle.join().unwrap().unwrap();
            assert_eq!(result.status, FitStatus::Converged);
        }

        let latest = shared.latest().unwrap().unwrap();
        assert_abs_diff_eq!(latest.parameters[0].value, 2.0, epsilon = 1e-6);
        assert_eq!(shared.state().unwrap(), SessionState::Succeeded);
    }
}
