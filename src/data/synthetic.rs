//! Reproducible synthetic data for demos and tests.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::error::{FitError, Result};

/// Parameters of a synthetic normal sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalSampleSpec {
    pub count: usize,
    pub mean: f64,
    pub sd: f64,
    pub seed: u64,
}

impl Default for NormalSampleSpec {
    fn default() -> Self {
        Self {
            count: 10_000,
            mean: 0.0,
            sd: 1.0,
            seed: 42,
        }
    }
}

/// Draw `spec.count` values from `N(mean, sd²)`. Same seed, same sample.
pub fn normal_sample(spec: &NormalSampleSpec) -> Result<Vec<f64>> {
    if spec.count == 0 {
        return Err(FitError::invalid("sample count must be > 0"));
    }
    let normal = Normal::new(spec.mean, spec.sd)
        .map_err(|e| FitError::invalid(format!("invalid normal distribution: {e}")))?;
    let mut rng = StdRng::seed_from_u64(spec.seed);
    Ok((0..spec.count).map(|_| normal.sample(&mut rng)).collect())
}

/// `y = f(x) + N(0, noise²)` on an even grid of `n` points over `[lo, hi]`.
pub fn noisy_curve(f: impl Fn(f64) -> f64, (lo, hi): (f64, f64), n: usize, noise: f64, seed: u64) -> Result<(Vec<f64>, Vec<f64>)> {
    if n < 2 || !(hi > lo) {
        return Err(FitError::invalid("noisy curve needs n >= 2 and hi > lo"));
    }
    let normal = Normal::new(0.0, noise)
        .map_err(|e| FitError::invalid(format!("invalid noise level: {e}")))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let step = (hi - lo) / (n - 1) as f64;
    let x: Vec<f64> = (0..n).map(|i| lo + i as f64 * step).collect();
    let y = x.iter().map(|&x| f(x) + normal.sample(&mut rng)).collect();
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_sample_is_reproducible() {
        let spec = NormalSampleSpec {
            count: 500,
            ..Default::default()
        };
        let a = normal_sample(&spec).unwrap();
        let b = normal_sample(&spec).unwrap();
        assert_eq!(a, b);

        let mean = a.iter().sum::<f64>() / a.len() as f64;
        assert!(mean.abs() < 0.2, "mean = {mean}");
    }

    #[test]
    fn rejects_bad_specs() {
        let zero = NormalSampleSpec {
            count: 0,
            ..Default::default()
        };
        assert!(normal_sample(&zero).is_err());

        let negative_sd = NormalSampleSpec {
            sd: -1.0,
            ..Default::default()
        };
        assert!(normal_sample(&negative_sd).is_err());
    }

    #[test]
    fn noisy_curve_grid() {
        let (x, y) = noisy_curve(|x| 2.0 * x, (0.0, 1.0), 11, 0.0, 1).unwrap();
        assert_eq!(x.len(), 11);
        assert!((x[10] - 1.0).abs() < 1e-12);
        assert!((y[5] - 1.0).abs() < 1e-12);
    }
}
