//! Process-wide model registry and start-value heuristics.
//!
//! The registry is a read-only lookup table populated on first use and never
//! mutated afterwards, so concurrent fit sessions share it without locking.

use std::f64::consts::PI;
use std::sync::LazyLock;

use crate::domain::{ModelCategory, ModelSpec, Parameter, SampleSet};
use crate::error::{FitError, Result};
use crate::models::builtin::{BuiltinKind, BuiltinModel};
use crate::models::model::{ModelDefinition, ModelFunction};

/// Upper limit for polynomial degree / Fourier order / number of peaks.
pub const MAX_DEGREE: usize = 20;

/// One registered built-in model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    pub category: ModelCategory,
    pub name: &'static str,
    pub display_name: &'static str,
    pub kind: BuiltinKind,
}

#[derive(Debug)]
pub struct ModelRegistry {
    entries: Vec<RegistryEntry>,
}

static REGISTRY: LazyLock<ModelRegistry> = LazyLock::new(ModelRegistry::with_builtins);

/// The shared registry.
pub fn registry() -> &'static ModelRegistry {
    &REGISTRY
}

impl ModelRegistry {
    fn with_builtins() -> Self {
        use BuiltinKind::*;
        use ModelCategory::*;

        let table: [(ModelCategory, &'static str, &'static str, BuiltinKind); 23] = [
            (Basic, "polynomial", "Polynomial", Polynomial),
            (Basic, "power", "Power", Power),
            (Basic, "exponential", "Exponential", Exponential),
            (Basic, "inverse_exponential", "Inverse exponential", InverseExponential),
            (Basic, "fourier", "Fourier", Fourier),
            (Peak, "gaussian", "Gaussian (normal)", GaussianPeak),
            (Peak, "lorentz", "Cauchy-Lorentz", LorentzPeak),
            (Peak, "sech", "Hyperbolic secant (sech)", SechPeak),
            (Peak, "logistic", "Logistic (sech squared)", LogisticPeak),
            (Growth, "atan", "Inverse tangent", Atan),
            (Growth, "tanh", "Hyperbolic tangent", Tanh),
            (Growth, "algebraic_sigmoid", "Algebraic sigmoid", AlgebraicSigmoid),
            (Growth, "logistic_function", "Logistic function", LogisticFunction),
            (Growth, "erf", "Error function (erf)", ErfGrowth),
            (Growth, "hill", "Hill", Hill),
            (Growth, "gompertz", "Gompertz", Gompertz),
            (Growth, "gudermann", "Gudermann (gd)", Gudermann),
            (Distribution, "gaussian", "Gaussian (normal)", GaussianDist),
            (Distribution, "laplace", "Laplace", LaplaceDist),
            (Distribution, "cauchy_lorentz", "Cauchy-Lorentz", CauchyDist),
            (Distribution, "logistic", "Logistic", LogisticDist),
            (Distribution, "lognormal", "Log-normal", LognormalDist),
            (Distribution, "exponential", "Exponential", ExponentialDist),
        ];

        let entries = table
            .into_iter()
            .map(|(category, name, display_name, kind)| RegistryEntry {
                category,
                name,
                display_name,
                kind,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn entries_in(&self, category: ModelCategory) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    pub fn lookup(&self, category: ModelCategory, name: &str) -> Option<&RegistryEntry> {
        self.entries
            .iter()
            .find(|e| e.category == category && e.name.eq_ignore_ascii_case(name))
    }

    /// Resolve a registered `(category, name)` into a model definition.
    pub fn resolve(&self, category: ModelCategory, name: &str, degree: usize) -> Result<ModelDefinition> {
        if category == ModelCategory::Custom {
            return Err(FitError::invalid(
                "custom models are defined by an expression and a parameter list",
            ));
        }
        let entry = self.lookup(category, name).ok_or_else(|| FitError::UnknownModel {
            category: category.to_string(),
            name: name.to_string(),
        })?;
        if entry.kind.uses_degree() && !(1..=MAX_DEGREE).contains(&degree) {
            return Err(FitError::invalid(format!(
                "degree of '{}' must be in 1..={MAX_DEGREE}, got {degree}",
                entry.name
            )));
        }
        Ok(ModelDefinition::builtin(
            category,
            entry.name,
            BuiltinModel::new(entry.kind, degree),
        ))
    }

    pub fn resolve_spec(&self, spec: &ModelSpec) -> Result<ModelDefinition> {
        match spec {
            ModelSpec::Registered { category, name, degree } => self.resolve(*category, name, *degree),
            ModelSpec::Custom { expression, parameters } => ModelDefinition::custom(expression, parameters),
        }
    }

    /// Start values derived from the data, with the model's default bounds.
    ///
    /// Custom models start every parameter at 1.0; explicit user start values are
    /// applied on top of this by the fit session.
    pub fn estimate_start_values(&self, definition: &ModelDefinition, samples: &SampleSet) -> Vec<Parameter> {
        let values = match definition.function() {
            ModelFunction::Custom(_) => vec![1.0; definition.parameter_count()],
            ModelFunction::Builtin(model) => estimate_builtin(model, &SampleSummary::of(samples)),
        };
        definition.parameters_with_values(&values)
    }
}

/// Moments and ranges used by the heuristics.
#[derive(Debug, Clone, Copy)]
struct SampleSummary {
    xmin: f64,
    xmax: f64,
    xrange: f64,
    ymax: f64,
    ymean: f64,
    /// Weighted mean of x using `max(y, 0)` as weights.
    mean: f64,
    sd: f64,
    /// Area under the samples (midpoint rule over sorted x).
    area: f64,
    log_mean: f64,
    log_sd: f64,
}

impl SampleSummary {
    fn of(samples: &SampleSet) -> Self {
        let (xmin, xmax) = samples.x_range();
        let xrange = xmax - xmin;
        let (_, ymax) = samples.y_range();
        let n = samples.len() as f64;
        let ymean = samples.y().iter().sum::<f64>() / n;

        let fallback_sd = if xrange > 0.0 { xrange / 10.0 } else { 1.0 };
        let (mean, sd) = weighted_moments(samples.x().iter().copied(), samples.y())
            .unwrap_or(((xmin + xmax) / 2.0, fallback_sd));
        let sd = if sd.is_finite() && sd > 0.0 { sd } else { fallback_sd };

        let positive: Vec<(f64, f64)> = samples
            .x()
            .iter()
            .zip(samples.y())
            .filter(|(x, _)| **x > 0.0)
            .map(|(x, y)| (x.ln(), *y))
            .collect();
        let log_ys: Vec<f64> = positive.iter().map(|(_, y)| *y).collect();
        let (log_mean, log_sd) = weighted_moments(positive.iter().map(|(lx, _)| *lx), &log_ys).unwrap_or((0.0, 1.0));
        let log_sd = if log_sd.is_finite() && log_sd > 0.0 { log_sd } else { 1.0 };

        Self {
            xmin,
            xmax,
            xrange,
            ymax,
            ymean,
            mean,
            sd,
            area: area_under(samples.x(), samples.y()),
            log_mean,
            log_sd,
        }
    }

    fn mid(&self) -> f64 {
        (self.xmin + self.xmax) / 2.0
    }

    fn width(&self, parts: f64) -> f64 {
        if self.xrange > 0.0 { self.xrange / parts } else { 1.0 }
    }

    fn amplitude(&self) -> f64 {
        if self.ymax != 0.0 && self.ymax.is_finite() { self.ymax } else { 1.0 }
    }

    fn area_or_one(&self) -> f64 {
        if self.area > 0.0 && self.area.is_finite() { self.area } else { 1.0 }
    }
}

/// Mean and standard deviation of `xs` weighted by `max(y, 0)`.
fn weighted_moments(xs: impl Iterator<Item = f64> + Clone, ys: &[f64]) -> Option<(f64, f64)> {
    let total: f64 = ys.iter().map(|y| y.max(0.0)).sum();
    if !(total > 0.0) {
        return None;
    }
    let mean = xs.clone().zip(ys).map(|(x, y)| x * y.max(0.0)).sum::<f64>() / total;
    let var = xs.zip(ys).map(|(x, y)| (x - mean) * (x - mean) * y.max(0.0)).sum::<f64>() / total;
    Some((mean, var.sqrt()))
}

/// Midpoint-rule area: each sample covers half the distance to its neighbours.
/// For evenly spaced bin centres this is exactly `Σ yᵢ · bin_width`.
fn area_under(x: &[f64], y: &[f64]) -> f64 {
    if x.len() < 2 {
        return y.first().copied().unwrap_or(0.0);
    }
    let mut idx: Vec<usize> = (0..x.len()).collect();
    idx.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(std::cmp::Ordering::Equal));

    let last = idx.len() - 1;
    idx.iter()
        .enumerate()
        .map(|(k, &i)| {
            let width = if k == 0 {
                x[idx[1]] - x[i]
            } else if k == last {
                x[i] - x[idx[k - 1]]
            } else {
                (x[idx[k + 1]] - x[idx[k - 1]]) / 2.0
            };
            y[i] * width
        })
        .sum()
}

fn estimate_builtin(model: &BuiltinModel, s: &SampleSummary) -> Vec<f64> {
    let n = model.parameter_names().len();
    match model.kind {
        BuiltinKind::Polynomial | BuiltinKind::Power | BuiltinKind::Exponential | BuiltinKind::InverseExponential => {
            vec![1.0; n]
        }
        BuiltinKind::Fourier => {
            let mut p = vec![1.0; n];
            p[0] = 2.0 * PI / s.width(1.0);
            p[1] = s.ymean;
            p
        }
        kind @ (BuiltinKind::GaussianPeak | BuiltinKind::LorentzPeak | BuiltinKind::SechPeak | BuiltinKind::LogisticPeak) => {
            // Equidistant centres; width and height shared by all peaks.
            let d = model.degree as f64;
            let width = s.width(10.0 * d);
            let height_to_area = match kind {
                BuiltinKind::GaussianPeak => (2.0 * PI).sqrt() * width,
                BuiltinKind::LogisticPeak => 4.0 * width,
                _ => PI * width,
            };
            (0..model.degree)
                .flat_map(|k| {
                    let mu = s.xmin + (k as f64 + 1.0) * s.xrange / (d + 1.0);
                    [s.amplitude() * height_to_area, width, mu]
                })
                .collect()
        }
        BuiltinKind::Atan | BuiltinKind::Gudermann => vec![2.0 * s.amplitude() / PI, s.mid(), s.width(10.0)],
        BuiltinKind::Tanh | BuiltinKind::AlgebraicSigmoid => vec![s.amplitude(), s.mid(), s.width(10.0)],
        BuiltinKind::ErfGrowth => vec![2.0 * s.amplitude(), s.mid(), s.width(10.0)],
        BuiltinKind::LogisticFunction => vec![s.amplitude(), 1.0 / s.width(10.0), s.mid()],
        BuiltinKind::Hill => vec![s.amplitude(), 1.0, s.width(10.0)],
        BuiltinKind::Gompertz => vec![s.amplitude(), 1.0, 1.0],
        BuiltinKind::GaussianDist => vec![s.area_or_one(), s.sd, s.mean],
        BuiltinKind::LaplaceDist => vec![s.area_or_one(), s.sd / 2f64.sqrt(), s.mean],
        BuiltinKind::CauchyDist => vec![s.area_or_one(), s.sd, s.mean],
        BuiltinKind::LogisticDist => vec![s.area_or_one(), s.sd * 3f64.sqrt() / PI, s.mean],
        BuiltinKind::LognormalDist => vec![s.area_or_one(), s.log_sd, s.log_mean],
        BuiltinKind::ExponentialDist => {
            let spread = s.mean - s.xmin;
            let rate = if spread > 0.0 { 1.0 / spread } else { 1.0 };
            vec![s.area_or_one(), rate, s.xmin]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn gaussian_samples(a: f64, s: f64, mu: f64) -> SampleSet {
        let x: Vec<f64> = (0..81).map(|i| -4.0 + i as f64 * 0.1).collect();
        let m = BuiltinModel::new(BuiltinKind::GaussianDist, 1);
        let y = x.iter().map(|&x| m.evaluate(x, &[a, s, mu])).collect();
        SampleSet::new(x, y, None).unwrap()
    }

    #[test]
    fn resolves_registered_models() {
        let def = registry().resolve(ModelCategory::Distribution, "gaussian", 1).unwrap();
        assert_eq!(def.parameter_names(), &["a", "s", "mu"]);
        assert_eq!(def.category(), ModelCategory::Distribution);

        let def = registry().resolve(ModelCategory::Basic, "Polynomial", 3).unwrap();
        assert_eq!(def.parameter_count(), 4);
    }

    #[test]
    fn unknown_model_is_reported() {
        let err = registry().resolve(ModelCategory::Growth, "nope", 1).unwrap_err();
        assert_eq!(
            err,
            FitError::UnknownModel {
                category: "growth".to_string(),
                name: "nope".to_string()
            }
        );
        assert!(matches!(
            registry().resolve(ModelCategory::Basic, "polynomial", 0),
            Err(FitError::InvalidConfig(_))
        ));
    }

    #[test]
    fn every_category_but_custom_is_populated() {
        for category in ModelCategory::ALL {
            let count = registry().entries_in(category).count();
            if category == ModelCategory::Custom {
                assert_eq!(count, 0);
            } else {
                assert!(count > 0, "{category} has no models");
            }
        }
    }

    #[test]
    fn gaussian_start_values_come_from_moments() {
        let samples = gaussian_samples(3.0, 0.8, 0.5);
        let def = registry().resolve(ModelCategory::Distribution, "gaussian", 1).unwrap();
        let params = registry().estimate_start_values(&def, &samples);
        assert_abs_diff_eq!(params[0].value, 3.0, epsilon = 1e-3);
        assert_abs_diff_eq!(params[1].value, 0.8, epsilon = 1e-3);
        assert_abs_diff_eq!(params[2].value, 0.5, epsilon = 1e-3);
        assert_eq!(params[1].lower, 0.0);
    }

    #[test]
    fn peak_centres_are_equidistant() {
        let x: Vec<f64> = (0..=30).map(f64::from).collect();
        let y = vec![1.0; x.len()];
        let samples = SampleSet::new(x, y, None).unwrap();
        let def = registry().resolve(ModelCategory::Peak, "gaussian", 2).unwrap();
        let params = registry().estimate_start_values(&def, &samples);
        assert_abs_diff_eq!(params[2].value, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(params[5].value, 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(params[1].value, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn custom_models_start_at_one() {
        let samples = gaussian_samples(1.0, 1.0, 0.0);
        let def = registry()
            .resolve_spec(&ModelSpec::custom("B0 + B1*x", &["B0", "B1"]))
            .unwrap();
        let params = registry().estimate_start_values(&def, &samples);
        assert!(params.iter().all(|p| p.value == 1.0 && !p.fixed));
    }

    #[test]
    fn area_matches_bin_sum_for_uniform_spacing() {
        let x = [0.5, 1.5, 2.5, 3.5];
        let y = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(area_under(&x, &y), 10.0, epsilon = 1e-12);
    }
}
