//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - read from JSON fit jobs
//! - exported to JSON/CSV after a fit

use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Model family, mirroring the categories a user picks from in a fit dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    /// Polynomial, power, exponential, Fourier.
    Basic,
    /// Peak functions (Gaussian, Lorentz, ...), possibly several peaks.
    Peak,
    /// Sigmoidal growth functions.
    Growth,
    /// Probability density functions, typically fitted to histograms.
    Distribution,
    /// User-supplied expression.
    Custom,
}

impl ModelCategory {
    pub const ALL: [ModelCategory; 5] = [
        ModelCategory::Basic,
        ModelCategory::Peak,
        ModelCategory::Growth,
        ModelCategory::Distribution,
        ModelCategory::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelCategory::Basic => "basic",
            ModelCategory::Peak => "peak",
            ModelCategory::Growth => "growth",
            ModelCategory::Distribution => "distribution",
            ModelCategory::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_degree() -> usize {
    1
}

/// Which model to fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    /// A model from the registry, looked up by `(category, name)`.
    ///
    /// `degree` is the polynomial degree, Fourier order or number of peaks; other
    /// models ignore it.
    Registered {
        category: ModelCategory,
        name: String,
        #[serde(default = "default_degree")]
        degree: usize,
    },
    /// A user-supplied formula over `x` and the listed parameters.
    Custom {
        expression: String,
        parameters: Vec<String>,
    },
}

impl ModelSpec {
    pub fn registered(category: ModelCategory, name: impl Into<String>) -> Self {
        ModelSpec::Registered {
            category,
            name: name.into(),
            degree: 1,
        }
    }

    pub fn registered_with_degree(category: ModelCategory, name: impl Into<String>, degree: usize) -> Self {
        ModelSpec::Registered {
            category,
            name: name.into(),
            degree,
        }
    }

    pub fn custom<S: AsRef<str>>(expression: impl Into<String>, parameters: &[S]) -> Self {
        ModelSpec::Custom {
            expression: expression.into(),
            parameters: parameters.iter().map(|p| p.as_ref().to_string()).collect(),
        }
    }
}

/// A fit parameter as seen by the solver.
///
/// Invariant while solving: a fixed parameter has `lower == upper == value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
    pub fixed: bool,
}

impl Parameter {
    /// A free, unbounded parameter.
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
            fixed: false,
        }
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Pin the parameter at its current value.
    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self.lower = self.value;
        self.upper = self.value;
        self
    }

    pub fn is_free(&self) -> bool {
        !self.fixed
    }

    /// Clamp `v` into `[lower, upper]`; the flag reports whether clamping happened.
    pub fn clamp(&self, v: f64) -> (f64, bool) {
        if v < self.lower {
            (self.lower, true)
        } else if v > self.upper {
            (self.upper, true)
        } else {
            (v, false)
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.lower.is_nan() || self.upper.is_nan() || self.lower > self.upper {
            return Err(FitError::invalid(format!(
                "parameter '{}': lower bound {} exceeds upper bound {}",
                self.name, self.lower, self.upper
            )));
        }
        if !self.value.is_finite() {
            return Err(FitError::invalid(format!(
                "parameter '{}': start value {} is not finite",
                self.name, self.value
            )));
        }
        Ok(())
    }
}

/// Per-parameter user overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterOverride {
    /// Explicit start value; unset values come from the model's estimator.
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    /// Keep the parameter at its start value.
    #[serde(default)]
    pub fixed: bool,
}

/// Levenberg–Marquardt tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub max_iterations: usize,
    /// Relative SSR improvement (or relative parameter change) below which an
    /// accepted step counts as "no progress".
    pub tolerance: f64,
    /// Consecutive low-improvement accepted steps required to declare convergence.
    pub consecutive_hits: usize,
    /// Damping retries per iteration before the point is declared stationary.
    pub max_sub_iterations: usize,
    pub initial_lambda: f64,
    pub lambda_min: f64,
    pub lambda_max: f64,
    /// Confidence level (percent) for parameter margins.
    pub confidence_level: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-9,
            consecutive_hits: 2,
            max_sub_iterations: 10,
            initial_lambda: 1e-3,
            lambda_min: 1e-12,
            lambda_max: 1e12,
            confidence_level: 95.0,
        }
    }
}

impl SolverOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(FitError::invalid("max_iterations must be >= 1"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(FitError::invalid("tolerance must be finite and > 0"));
        }
        if self.consecutive_hits == 0 || self.max_sub_iterations == 0 {
            return Err(FitError::invalid("consecutive_hits and max_sub_iterations must be >= 1"));
        }
        if !(self.initial_lambda > 0.0 && self.lambda_min > 0.0 && self.lambda_max > self.lambda_min) {
            return Err(FitError::invalid("damping limits must satisfy 0 < lambda_min < lambda_max"));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 100.0) {
            return Err(FitError::invalid("confidence_level must be in (0, 100)"));
        }
        Ok(())
    }
}

/// Where the fitted curve is evaluated for output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputDomain {
    /// At the x values of the fitted samples.
    #[default]
    InputX,
    /// On a regular grid. `points` defaults to the sample count, `range` to the
    /// data x range.
    Grid {
        #[serde(default)]
        points: Option<usize>,
        #[serde(default)]
        range: Option<(f64, f64)>,
    },
}

/// Everything a caller can override for one fit, submitted atomically to
/// `FitSession::configure`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOverrides {
    pub parameters: BTreeMap<String, ParameterOverride>,
    pub solver: SolverOptions,
    pub output: OutputDomain,
    /// Only samples with `lo <= x <= hi` are fitted; `None` fits all of them.
    pub fit_range: Option<(f64, f64)>,
    /// Feed fitted values back as start values for the next recalculation.
    pub use_results_as_start: bool,
}

impl FitOverrides {
    pub fn builder() -> FitOverridesBuilder {
        FitOverridesBuilder::default()
    }
}

/// Builder for [`FitOverrides`].
#[derive(Debug, Clone, Default)]
pub struct FitOverridesBuilder {
    inner: FitOverrides,
}

impl FitOverridesBuilder {
    fn entry(&mut self, name: &str) -> &mut ParameterOverride {
        self.inner.parameters.entry(name.to_string()).or_default()
    }

    pub fn start(mut self, name: &str, value: f64) -> Self {
        self.entry(name).start = Some(value);
        self
    }

    /// Start values in parameter order, e.g. `&[("B0", 1.0), ("B1", 0.5)]`.
    pub fn starts(mut self, values: &[(&str, f64)]) -> Self {
        for (name, value) in values {
            self.entry(name).start = Some(*value);
        }
        self
    }

    pub fn bounds(mut self, name: &str, lower: f64, upper: f64) -> Self {
        let e = self.entry(name);
        e.lower = Some(lower);
        e.upper = Some(upper);
        self
    }

    /// Fix a parameter at `value`.
    pub fn fix(mut self, name: &str, value: f64) -> Self {
        let e = self.entry(name);
        e.start = Some(value);
        e.fixed = true;
        self
    }

    pub fn solver(mut self, options: SolverOptions) -> Self {
        self.inner.solver = options;
        self
    }

    pub fn max_iterations(mut self, n: usize) -> Self {
        self.inner.solver.max_iterations = n;
        self
    }

    pub fn tolerance(mut self, tol: f64) -> Self {
        self.inner.solver.tolerance = tol;
        self
    }

    pub fn output(mut self, output: OutputDomain) -> Self {
        self.inner.output = output;
        self
    }

    pub fn fit_range(mut self, lo: f64, hi: f64) -> Self {
        self.inner.fit_range = Some((lo, hi));
        self
    }

    pub fn use_results_as_start(mut self, yes: bool) -> Self {
        self.inner.use_results_as_start = yes;
        self
    }

    pub fn build(self) -> FitOverrides {
        self.inner
    }
}

/// The (x, y, weight) samples a fit runs against.
///
/// Invariant: all three arrays have the same length `n >= 1` and hold finite
/// values; weights are non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    x: Vec<f64>,
    y: Vec<f64>,
    weights: Vec<f64>,
}

impl SampleSet {
    /// Build a sample set; `weights = None` means unit weights.
    pub fn new(x: Vec<f64>, y: Vec<f64>, weights: Option<Vec<f64>>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(FitError::invalid(format!(
                "x and y lengths differ ({} vs {})",
                x.len(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(FitError::EmptySource);
        }
        let weights = weights.unwrap_or_else(|| vec![1.0; x.len()]);
        if weights.len() != x.len() {
            return Err(FitError::invalid("weight array length differs from sample count"));
        }
        if x.iter().chain(&y).any(|v| !v.is_finite()) {
            return Err(FitError::invalid("samples must be finite"));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(FitError::invalid("weights must be finite and non-negative"));
        }
        Ok(Self { x, y, weights })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// `(min, max)` of x.
    pub fn x_range(&self) -> (f64, f64) {
        min_max(&self.x)
    }

    /// `(min, max)` of y.
    pub fn y_range(&self) -> (f64, f64) {
        min_max(&self.y)
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Terminal solver outcome. Not an error: every variant comes with inspectable
/// best-effort parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitStatus {
    Converged,
    MaxIterationsReached,
    /// Residuals or the Jacobian became NaN/Inf at the current parameters.
    Diverged { iteration: usize },
    /// A cooperative cancel request was observed.
    Cancelled { iteration: usize },
}

impl FitStatus {
    /// `Converged` or `MaxIterationsReached`.
    pub fn is_success(&self) -> bool {
        matches!(self, FitStatus::Converged | FitStatus::MaxIterationsReached)
    }
}

impl std::fmt::Display for FitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitStatus::Converged => write!(f, "converged"),
            FitStatus::MaxIterationsReached => write!(f, "maximum number of iterations reached"),
            FitStatus::Diverged { iteration } => write!(f, "diverged at iteration {iteration}"),
            FitStatus::Cancelled { iteration } => write!(f, "cancelled at iteration {iteration}"),
        }
    }
}

/// One parameter of a finished fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub name: String,
    pub value: f64,
    /// `None` for fixed parameters or when `n <= free parameters`.
    pub std_error: Option<f64>,
    pub t_value: Option<f64>,
    pub p_value: Option<f64>,
    /// Half-width of the confidence interval.
    pub margin: Option<f64>,
    pub fixed: bool,
    /// The final value sits on a bound the solver had to clamp to.
    pub at_bound: bool,
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodnessOfFit {
    pub n: usize,
    pub dof: usize,
    pub sse: f64,
    pub rms: Option<f64>,
    pub rsd: Option<f64>,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub sst: f64,
    pub rsquare: Option<f64>,
    pub rsquare_adj: Option<f64>,
    pub chisq_p: Option<f64>,
    pub log_lik: Option<f64>,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
}

/// Model values for the plotting layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSeries {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Fit output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub category: ModelCategory,
    pub model: String,
    pub equation: String,
    pub status: FitStatus,
    pub iterations: usize,
    /// Weighted sum of squared residuals at the reported parameters.
    pub ssr: f64,
    pub parameters: Vec<ParameterEstimate>,
    pub quality: GoodnessOfFit,
    /// Unweighted residuals `yᵢ − f(xᵢ)` at the fitted samples.
    pub residuals: Vec<f64>,
    /// Correlation matrix of the free parameters (row-major, free parameters only).
    pub correlation: Option<Vec<Vec<f64>>>,
    pub output: OutputSeries,
}

impl FitResult {
    pub fn parameter(&self, name: &str) -> Option<&ParameterEstimate> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Parameter values in model order.
    pub fn values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_parameter_collapses_bounds() {
        let p = Parameter::new("a", 2.5).with_bounds(0.0, 10.0).fixed();
        assert_eq!((p.lower, p.upper), (2.5, 2.5));
        assert!(!p.is_free());
    }

    #[test]
    fn clamp_reports_boundary_hits() {
        let p = Parameter::new("s", 1.0).with_bounds(0.0, 5.0);
        assert_eq!(p.clamp(-1.0), (0.0, true));
        assert_eq!(p.clamp(3.0), (3.0, false));
        assert_eq!(p.clamp(9.0), (5.0, true));
    }

    #[test]
    fn sample_set_rejects_mismatch_and_empty() {
        assert!(matches!(
            SampleSet::new(vec![1.0], vec![1.0, 2.0], None),
            Err(FitError::InvalidConfig(_))
        ));
        assert_eq!(SampleSet::new(vec![], vec![], None), Err(FitError::EmptySource));
        let s = SampleSet::new(vec![3.0, 1.0], vec![0.0, 2.0], None).unwrap();
        assert_eq!(s.weights(), &[1.0, 1.0]);
        assert_eq!(s.x_range(), (1.0, 3.0));
    }

    #[test]
    fn overrides_builder_collects_per_parameter_settings() {
        let o = FitOverrides::builder()
            .start("B0", 1.0)
            .bounds("B1", 0.0, 5.0)
            .fix("B2", 3.0)
            .max_iterations(50)
            .build();
        assert_eq!(o.parameters["B0"].start, Some(1.0));
        assert_eq!(o.parameters["B1"].upper, Some(5.0));
        assert!(o.parameters["B2"].fixed);
        assert_eq!(o.solver.max_iterations, 50);
    }

    #[test]
    fn model_spec_json_shape() {
        let spec: ModelSpec =
            serde_json::from_str(r#"{"kind":"registered","category":"distribution","name":"gaussian"}"#).unwrap();
        assert_eq!(spec, ModelSpec::registered(ModelCategory::Distribution, "gaussian"));

        let status = serde_json::to_string(&FitStatus::Diverged { iteration: 3 }).unwrap();
        assert_eq!(status, r#"{"status":"diverged","iteration":3}"#);
    }
}
