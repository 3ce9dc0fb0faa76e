//! Damped least squares (Levenberg–Marquardt).
//!
//! Minimizes `SSR(p) = Σ wᵢ (yᵢ − f(xᵢ; p))²` over the free parameters.
//!
//! Per iteration:
//! - forward-difference Jacobian of `√wᵢ·f(xᵢ; p)` with step `max(|p|, 1)·√ε`,
//!   one column per free parameter, columns evaluated in parallel
//! - parameters sitting on a bound whose descent direction points outward are
//!   pinned for the iteration; the rest solve `(JᵀJ + λI) δ = Jᵀr`
//! - clamp `p + δ` into the bounds
//! - accept if SSR decreased (λ ← λ/10, floored at `lambda_min`), otherwise
//!   λ ← 10λ and retry, at most `max_sub_iterations` times
//!
//! An accepted step whose relative SSR improvement or relative parameter change
//! is below `tolerance` counts as a hit; `consecutive_hits` hits in a row is
//! convergence. When no retry reduces SSR the current point is stationary and
//! is also reported as converged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::domain::{FitResult, FitStatus, OutputSeries, Parameter, ParameterEstimate, SampleSet, SolverOptions};
use crate::math::{goodness_of_fit, invert_spd, solve_damped, t_margin, t_p_value};
use crate::models::ModelDefinition;

/// Cooperative cancellation flag, checked once per iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the token can be reused.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Model, samples and square-rooted weights for one solve.
struct Problem<'a> {
    model: &'a ModelDefinition,
    x: &'a [f64],
    y: &'a [f64],
    sqrt_w: Vec<f64>,
}

impl<'a> Problem<'a> {
    fn new(model: &'a ModelDefinition, samples: &'a SampleSet) -> Self {
        Self {
            model,
            x: samples.x(),
            y: samples.y(),
            sqrt_w: samples.weights().iter().map(|w| w.sqrt()).collect(),
        }
    }

    fn model_values(&self, params: &[f64]) -> Vec<f64> {
        self.model.evaluate_all(self.x, params)
    }

    /// Weighted residuals `√wᵢ·(yᵢ − fᵢ)`.
    fn residuals(&self, fx: &[f64]) -> Vec<f64> {
        self.y
            .iter()
            .zip(fx)
            .zip(&self.sqrt_w)
            .map(|((y, f), sw)| sw * (y - f))
            .collect()
    }

    /// `n × free.len()` Jacobian of the weighted model values.
    fn jacobian(&self, params: &[f64], fx: &[f64], free: &[usize], bounds: &[Parameter]) -> DMatrix<f64> {
        let columns: Vec<Vec<f64>> = free
            .par_iter()
            .map(|&j| {
                let p = params[j];
                let mut step = p.abs().max(1.0) * f64::EPSILON.sqrt();
                if p + step > bounds[j].upper {
                    step = -step;
                }
                let mut shifted = params.to_vec();
                shifted[j] = p + step;
                // Use the representable step, not the nominal one.
                let h = shifted[j] - p;
                self.x
                    .iter()
                    .zip(fx)
                    .zip(&self.sqrt_w)
                    .map(|((&x, &f0), &sw)| sw * (self.model.evaluate(x, &shifted) - f0) / h)
                    .collect()
            })
            .collect();

        DMatrix::from_fn(self.x.len(), free.len(), |i, k| columns[k][i])
    }
}

/// On a finite bound with the descent direction `g` pointing out of the box.
fn pinned(p: &Parameter, value: f64, g: f64) -> bool {
    (p.lower.is_finite() && value <= p.lower && g < 0.0) || (p.upper.is_finite() && value >= p.upper && g > 0.0)
}

fn sum_sq(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

/// Current iterate.
struct State {
    values: Vec<f64>,
    fx: Vec<f64>,
    residuals: Vec<f64>,
    ssr: f64,
}

impl State {
    fn at(problem: &Problem<'_>, values: Vec<f64>) -> Self {
        let fx = problem.model_values(&values);
        let residuals = problem.residuals(&fx);
        let ssr = sum_sq(&residuals);
        Self {
            values,
            fx,
            residuals,
            ssr,
        }
    }
}

/// Run the solver from `start` and compute the result statistics.
///
/// Never fails: numerical trouble is reported through [`FitStatus`] together with
/// the best parameters reached. `output` in the returned result is left empty.
pub fn solve(
    model: &ModelDefinition,
    start: &[Parameter],
    samples: &SampleSet,
    options: &SolverOptions,
    cancel: Option<&CancelToken>,
) -> FitResult {
    let problem = Problem::new(model, samples);
    let free: Vec<usize> = start
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_free())
        .map(|(i, _)| i)
        .collect();

    let mut state = State::at(&problem, start.iter().map(|p| p.clamp(p.value).0).collect());
    let mut lambda = options.initial_lambda;
    let mut iterations = 0usize;
    let mut hits = 0usize;

    let status = 'solve: {
        if !state.ssr.is_finite() {
            break 'solve FitStatus::Diverged { iteration: 0 };
        }
        if free.is_empty() {
            break 'solve FitStatus::Converged;
        }

        while iterations < options.max_iterations {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                break 'solve FitStatus::Cancelled { iteration: iterations };
            }
            if state.ssr == 0.0 {
                break 'solve FitStatus::Converged;
            }

            let jac = problem.jacobian(&state.values, &state.fx, &free, start);
            iterations += 1;
            if jac.iter().any(|v| !v.is_finite()) {
                break 'solve FitStatus::Diverged { iteration: iterations };
            }
            let jt = jac.transpose();
            let a = &jt * &jac;
            let g = &jt * DVector::from_column_slice(&state.residuals);

            // Jᵀr is the descent direction for each free parameter.
            let active: Vec<usize> = free
                .iter()
                .enumerate()
                .filter(|&(k, &j)| !pinned(&start[j], state.values[j], g[k]))
                .map(|(k, _)| k)
                .collect();
            if active.is_empty() {
                debug!(iteration = iterations, ssr = state.ssr, "every free parameter is pinned at a bound");
                break 'solve FitStatus::Converged;
            }
            let a = a.select_rows(&active).select_columns(&active);
            let g = g.select_rows(&active);

            let mut accepted = None;
            for _ in 0..options.max_sub_iterations {
                let Some(delta) = solve_damped(&a, &g, lambda) else {
                    lambda = (lambda * 10.0).min(options.lambda_max);
                    continue;
                };
                let mut trial = state.values.clone();
                let mut constrained = false;
                for (m, &k) in active.iter().enumerate() {
                    let j = free[k];
                    let (value, clamped) = start[j].clamp(state.values[j] + delta[m]);
                    trial[j] = value;
                    constrained |= clamped;
                }
                if constrained || active.len() < free.len() {
                    debug!(
                        iteration = iterations,
                        pinned = free.len() - active.len(),
                        clamped = constrained,
                        "boundary-constrained step"
                    );
                }
                let next = State::at(&problem, trial);
                if next.ssr.is_finite() && next.ssr < state.ssr {
                    lambda = (lambda / 10.0).max(options.lambda_min);
                    accepted = Some(next);
                    break;
                }
                lambda = (lambda * 10.0).min(options.lambda_max);
            }

            let Some(next) = accepted else {
                debug!(iteration = iterations, ssr = state.ssr, "no damped step reduces SSR");
                break 'solve FitStatus::Converged;
            };

            let improvement = (state.ssr - next.ssr) / state.ssr;
            let step = free
                .iter()
                .map(|&j| (next.values[j] - state.values[j]).abs() / (state.values[j].abs() + options.tolerance))
                .fold(0.0, f64::max);
            state = next;
            debug!(iteration = iterations, ssr = state.ssr, lambda, improvement, "accepted step");

            if improvement <= options.tolerance || step <= options.tolerance {
                hits += 1;
                if hits >= options.consecutive_hits {
                    break 'solve FitStatus::Converged;
                }
            } else {
                hits = 0;
            }
        }
        FitStatus::MaxIterationsReached
    };

    summarize(&problem, model, start, &free, state, status, iterations, options)
}

#[allow(clippy::too_many_arguments)]
fn summarize(
    problem: &Problem<'_>,
    model: &ModelDefinition,
    start: &[Parameter],
    free: &[usize],
    state: State,
    status: FitStatus,
    iterations: usize,
    options: &SolverOptions,
) -> FitResult {
    let n = problem.x.len();
    let dof = n.saturating_sub(free.len());

    // (JᵀJ)⁻¹ over the free parameters.
    let covariance = if state.ssr.is_finite() && !free.is_empty() {
        let jac = problem.jacobian(&state.values, &state.fx, free, start);
        invert_spd(&(jac.transpose() * &jac))
    } else {
        None
    };
    let scale = (dof > 0).then(|| state.ssr / dof as f64);
    let alpha = 1.0 - options.confidence_level / 100.0;

    let parameters = start
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let value = state.values[i];
            let std_error = match (free.iter().position(|&j| j == i), &covariance, scale) {
                (Some(k), Some(cov), Some(s)) => Some((cov[(k, k)] * s).sqrt()),
                _ => None,
            };
            let t_value = std_error.filter(|se| *se > 0.0).map(|se| value / se);
            let at_bound = p.is_free()
                && ((p.lower.is_finite() && value <= p.lower) || (p.upper.is_finite() && value >= p.upper));
            if at_bound {
                warn!(parameter = %p.name, value, "parameter ended on a bound");
            }
            ParameterEstimate {
                name: p.name.clone(),
                value,
                std_error,
                t_value,
                p_value: t_value.and_then(|t| t_p_value(t, dof as f64)),
                margin: std_error.and_then(|se| t_margin(alpha, dof as f64, se)),
                fixed: p.fixed,
                at_bound,
            }
        })
        .collect();

    let correlation = covariance.map(|cov| {
        let m = cov.nrows();
        (0..m)
            .map(|r| {
                (0..m)
                    .map(|c| cov[(r, c)] / (cov[(r, r)] * cov[(c, c)]).sqrt())
                    .collect()
            })
            .collect()
    });

    let weighted_y: Vec<f64> = problem.y.iter().zip(&problem.sqrt_w).map(|(y, sw)| y * sw).collect();
    let quality = goodness_of_fit(&state.residuals, &weighted_y, free.len());
    let residuals = problem.y.iter().zip(&state.fx).map(|(y, f)| y - f).collect();

    FitResult {
        category: model.category(),
        model: model.name().to_string(),
        equation: model.equation().to_string(),
        status,
        iterations,
        ssr: state.ssr,
        parameters,
        quality,
        residuals,
        correlation,
        output: OutputSeries::default(),
    }
}
