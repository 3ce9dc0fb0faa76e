//! Closed-form built-in models.
//!
//! Models are implemented as small, pure functions so that fitting code can stay
//! generic: every model is `f(x; p)` with `p` laid out in the order returned by
//! [`BuiltinModel::parameter_names`].
//!
//! Multi-term models (polynomial degree, Fourier order, number of peaks) take
//! their size from `degree`.

use std::f64::consts::{PI, SQRT_2};

use crate::math::erf;

const SQRT_2PI: f64 = 2.506_628_274_631_000_7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Polynomial,
    Power,
    Exponential,
    InverseExponential,
    Fourier,

    GaussianPeak,
    LorentzPeak,
    SechPeak,
    LogisticPeak,

    Atan,
    Tanh,
    AlgebraicSigmoid,
    LogisticFunction,
    ErfGrowth,
    Hill,
    Gompertz,
    Gudermann,

    GaussianDist,
    LaplaceDist,
    CauchyDist,
    LogisticDist,
    LognormalDist,
    ExponentialDist,
}

impl BuiltinKind {
    /// Whether `degree` changes the number of terms.
    pub fn uses_degree(self) -> bool {
        matches!(
            self,
            BuiltinKind::Polynomial
                | BuiltinKind::Fourier
                | BuiltinKind::GaussianPeak
                | BuiltinKind::LorentzPeak
                | BuiltinKind::SechPeak
                | BuiltinKind::LogisticPeak
        )
    }

    fn is_peak(self) -> bool {
        matches!(
            self,
            BuiltinKind::GaussianPeak | BuiltinKind::LorentzPeak | BuiltinKind::SechPeak | BuiltinKind::LogisticPeak
        )
    }

    /// Per-term parameter names (peaks) or the full list (everything else).
    fn base_names(self) -> &'static [&'static str] {
        match self {
            BuiltinKind::Polynomial | BuiltinKind::Fourier => &[],
            BuiltinKind::Power | BuiltinKind::Exponential => &["a", "b"],
            BuiltinKind::InverseExponential => &["a", "b", "c"],
            BuiltinKind::GaussianPeak | BuiltinKind::SechPeak | BuiltinKind::LogisticPeak => &["a", "s", "mu"],
            BuiltinKind::LorentzPeak => &["a", "g", "mu"],
            BuiltinKind::Atan
            | BuiltinKind::Tanh
            | BuiltinKind::AlgebraicSigmoid
            | BuiltinKind::ErfGrowth
            | BuiltinKind::Gudermann => &["a", "mu", "s"],
            BuiltinKind::LogisticFunction => &["a", "k", "mu"],
            BuiltinKind::Hill => &["a", "n", "s"],
            BuiltinKind::Gompertz => &["a", "b", "c"],
            BuiltinKind::GaussianDist
            | BuiltinKind::LaplaceDist
            | BuiltinKind::LogisticDist
            | BuiltinKind::LognormalDist => &["a", "s", "mu"],
            BuiltinKind::CauchyDist => &["a", "g", "mu"],
            BuiltinKind::ExponentialDist => &["a", "l", "mu"],
        }
    }

    /// Names whose natural domain is strictly positive (widths, rates).
    fn positive_names(self) -> &'static [&'static str] {
        match self {
            BuiltinKind::GaussianPeak
            | BuiltinKind::SechPeak
            | BuiltinKind::LogisticPeak
            | BuiltinKind::GaussianDist
            | BuiltinKind::LaplaceDist
            | BuiltinKind::LogisticDist
            | BuiltinKind::LognormalDist => &["s"],
            BuiltinKind::LorentzPeak | BuiltinKind::CauchyDist => &["g"],
            BuiltinKind::ExponentialDist => &["l"],
            _ => &[],
        }
    }

    fn equation_template(self) -> &'static str {
        match self {
            BuiltinKind::Polynomial => "c0 + c1*x + ... + cn*x^n",
            BuiltinKind::Power => "a*x^b",
            BuiltinKind::Exponential => "a*exp(b*x)",
            BuiltinKind::InverseExponential => "a*(1-exp(b*x)) + c",
            BuiltinKind::Fourier => "a0 + sum(ak*cos(k*w*x) + bk*sin(k*w*x))",
            BuiltinKind::GaussianPeak | BuiltinKind::GaussianDist => "a/sqrt(2*pi)/s * exp(-((x-mu)/s)^2/2)",
            BuiltinKind::LorentzPeak | BuiltinKind::CauchyDist => "a/pi * g/(g^2+(x-mu)^2)",
            BuiltinKind::SechPeak => "a/pi/s * sech((x-mu)/s)",
            BuiltinKind::LogisticPeak | BuiltinKind::LogisticDist => "a/4/s * sech((x-mu)/2/s)^2",
            BuiltinKind::Atan => "a * atan((x-mu)/s)",
            BuiltinKind::Tanh => "a * tanh((x-mu)/s)",
            BuiltinKind::AlgebraicSigmoid => "a * (x-mu)/s/sqrt(1+((x-mu)/s)^2)",
            BuiltinKind::LogisticFunction => "a/(1+exp(-k*(x-mu)))",
            BuiltinKind::ErfGrowth => "a/2 * erf((x-mu)/s/sqrt(2))",
            BuiltinKind::Hill => "a * x^n/(s^n + x^n)",
            BuiltinKind::Gompertz => "a*exp(-b*exp(-c*x))",
            BuiltinKind::Gudermann => "a * asin(tanh((x-mu)/s))",
            BuiltinKind::LaplaceDist => "a/(2*s) * exp(-abs(x-mu)/s)",
            BuiltinKind::LognormalDist => "a/(sqrt(2*pi)*x*s) * exp(-((ln(x)-mu)/s)^2/2)",
            BuiltinKind::ExponentialDist => "a*l*exp(-l*(x-mu)), x >= mu",
        }
    }
}

/// A built-in model with its term count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuiltinModel {
    pub kind: BuiltinKind,
    pub degree: usize,
}

impl BuiltinModel {
    pub fn new(kind: BuiltinKind, degree: usize) -> Self {
        let degree = if kind.uses_degree() { degree.max(1) } else { 1 };
        Self { kind, degree }
    }

    pub fn parameter_names(&self) -> Vec<String> {
        match self.kind {
            BuiltinKind::Polynomial => (0..=self.degree).map(|k| format!("c{k}")).collect(),
            BuiltinKind::Fourier => {
                let mut names = vec!["w".to_string(), "a0".to_string()];
                for k in 1..=self.degree {
                    names.push(format!("a{k}"));
                    names.push(format!("b{k}"));
                }
                names
            }
            kind if kind.is_peak() && self.degree > 1 => (1..=self.degree)
                .flat_map(|d| kind.base_names().iter().map(move |n| format!("{n}{d}")))
                .collect(),
            kind => kind.base_names().iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Default `(lower, upper)` per parameter.
    pub fn default_bounds(&self) -> Vec<(f64, f64)> {
        let positive = self.kind.positive_names();
        self.parameter_names()
            .iter()
            .map(|name| {
                let base = name.trim_end_matches(|c: char| c.is_ascii_digit());
                if positive.contains(&base) {
                    (0.0, f64::INFINITY)
                } else {
                    (f64::NEG_INFINITY, f64::INFINITY)
                }
            })
            .collect()
    }

    pub fn equation(&self) -> String {
        match self.kind {
            BuiltinKind::Polynomial => {
                let mut terms = vec!["c0".to_string()];
                for k in 1..=self.degree {
                    terms.push(if k == 1 { "c1*x".to_string() } else { format!("c{k}*x^{k}") });
                }
                terms.join(" + ")
            }
            BuiltinKind::Fourier => {
                let mut eq = "a0".to_string();
                for k in 1..=self.degree {
                    let kw = if k == 1 { "w".to_string() } else { format!("{k}*w") };
                    eq.push_str(&format!(" + (a{k}*cos({kw}*x) + b{k}*sin({kw}*x))"));
                }
                eq
            }
            kind if kind.is_peak() && self.degree > 1 => format!("sum of {} x [{}]", self.degree, kind.equation_template()),
            kind => kind.equation_template().to_string(),
        }
    }

    /// Evaluate `f(x; p)`.
    pub fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        let at = |i: usize| p.get(i).copied().unwrap_or(f64::NAN);
        match self.kind {
            BuiltinKind::Polynomial => {
                // Horner, highest coefficient first.
                (0..=self.degree).rev().fold(0.0, |acc, k| acc * x + at(k))
            }
            BuiltinKind::Power => at(0) * x.powf(at(1)),
            BuiltinKind::Exponential => at(0) * (at(1) * x).exp(),
            BuiltinKind::InverseExponential => at(0) * (1.0 - (at(1) * x).exp()) + at(2),
            BuiltinKind::Fourier => {
                let w = at(0);
                let mut y = at(1);
                for k in 1..=self.degree {
                    let arg = k as f64 * w * x;
                    y += at(2 * k) * arg.cos() + at(2 * k + 1) * arg.sin();
                }
                y
            }
            kind if kind.is_peak() => (0..self.degree)
                .map(|d| peak(kind, x, at(3 * d), at(3 * d + 1), at(3 * d + 2)))
                .sum(),
            BuiltinKind::Atan => at(0) * ((x - at(1)) / at(2)).atan(),
            BuiltinKind::Tanh => at(0) * ((x - at(1)) / at(2)).tanh(),
            BuiltinKind::AlgebraicSigmoid => {
                let z = (x - at(1)) / at(2);
                at(0) * z / (1.0 + z * z).sqrt()
            }
            BuiltinKind::LogisticFunction => at(0) / (1.0 + (-at(1) * (x - at(2))).exp()),
            BuiltinKind::ErfGrowth => at(0) / 2.0 * erf((x - at(1)) / at(2) / SQRT_2),
            BuiltinKind::Hill => {
                let xn = x.powf(at(1));
                at(0) * xn / (at(2).powf(at(1)) + xn)
            }
            BuiltinKind::Gompertz => at(0) * (-at(1) * (-at(2) * x).exp()).exp(),
            BuiltinKind::Gudermann => at(0) * ((x - at(1)) / at(2)).tanh().asin(),
            BuiltinKind::GaussianDist => gaussian(x, at(0), at(1), at(2)),
            BuiltinKind::LaplaceDist => at(0) / (2.0 * at(1)) * (-(x - at(2)).abs() / at(1)).exp(),
            BuiltinKind::CauchyDist => lorentz(x, at(0), at(1), at(2)),
            BuiltinKind::LogisticDist => logistic(x, at(0), at(1), at(2)),
            BuiltinKind::LognormalDist => {
                if x <= 0.0 {
                    return 0.0;
                }
                let z = (x.ln() - at(2)) / at(1);
                at(0) / (SQRT_2PI * x * at(1)) * (-z * z / 2.0).exp()
            }
            BuiltinKind::ExponentialDist => {
                if x < at(2) {
                    return 0.0;
                }
                at(0) * at(1) * (-at(1) * (x - at(2))).exp()
            }
            // Peaks are handled by the guard arm above.
            BuiltinKind::GaussianPeak | BuiltinKind::LorentzPeak | BuiltinKind::SechPeak | BuiltinKind::LogisticPeak => {
                f64::NAN
            }
        }
    }
}

fn peak(kind: BuiltinKind, x: f64, a: f64, width: f64, mu: f64) -> f64 {
    match kind {
        BuiltinKind::GaussianPeak => gaussian(x, a, width, mu),
        BuiltinKind::LorentzPeak => lorentz(x, a, width, mu),
        BuiltinKind::SechPeak => a / PI / width / ((x - mu) / width).cosh(),
        BuiltinKind::LogisticPeak => logistic(x, a, width, mu),
        _ => f64::NAN,
    }
}

fn gaussian(x: f64, a: f64, s: f64, mu: f64) -> f64 {
    let z = (x - mu) / s;
    a / (SQRT_2PI * s) * (-z * z / 2.0).exp()
}

fn lorentz(x: f64, a: f64, g: f64, mu: f64) -> f64 {
    let d = x - mu;
    a / PI * g / (g * g + d * d)
}

fn logistic(x: f64, a: f64, s: f64, mu: f64) -> f64 {
    let sech = 1.0 / ((x - mu) / (2.0 * s)).cosh();
    a / (4.0 * s) * sech * sech
}
