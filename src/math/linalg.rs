//! Dense linear algebra for the Levenberg–Marquardt normal equations.
//!
//! Each solver iteration solves a small symmetric system
//!
//! ```text
//! (JᵀJ + λI) δ = Jᵀr
//! ```
//!
//! whose dimension is the number of free parameters (typically 1–20).
//!
//! Implementation choices:
//! - Cholesky first: the damped matrix is symmetric positive definite whenever
//!   λ > 0 or J has full column rank.
//! - SVD fallback with progressively looser tolerances for (near-)singular
//!   systems, e.g. an underdetermined fit with λ → λ_min.

use nalgebra::{DMatrix, DVector};

/// Solve `(a + lambda I) x = b` for a symmetric positive semi-definite `a`.
///
/// Returns `None` if no finite solution could be found.
pub fn solve_damped(a: &DMatrix<f64>, b: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let mut m = a.clone();
    for i in 0..m.nrows().min(m.ncols()) {
        m[(i, i)] += lambda;
    }

    if let Some(chol) = m.clone().cholesky() {
        let x = chol.solve(b);
        if x.iter().all(|v| v.is_finite()) {
            return Some(x);
        }
    }

    solve_least_squares(&m, b)
}

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Invert a symmetric positive definite matrix (used for `(JᵀJ)⁻¹`).
///
/// Returns `None` when the matrix is singular or the inverse has a non-positive
/// or non-finite diagonal, i.e. when a covariance estimate would be meaningless.
pub fn invert_spd(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let inv = match a.clone().cholesky() {
        Some(chol) => chol.inverse(),
        None => a.clone().try_inverse()?,
    };

    let diag_ok = (0..inv.nrows()).all(|i| inv[(i, i)].is_finite() && inv[(i, i)] > 0.0);
    if diag_ok && inv.iter().all(|v| v.is_finite()) {
        Some(inv)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn damped_solve_matches_undamped_at_zero_lambda() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0]);
        let x = solve_damped(&a, &b, 0.0).unwrap();
        let residual = &a * &x - &b;
        assert!(residual.norm() < 1e-12);
    }

    #[test]
    fn damping_regularizes_singular_system() {
        // Rank-deficient JᵀJ: undamped Cholesky fails, damping makes it solvable.
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_row_slice(&[2.0, 2.0]);
        let x = solve_damped(&a, &b, 1e-3).unwrap();
        assert!(x.iter().all(|v| v.is_finite()));
        assert!((x[0] - x[1]).abs() < 1e-9);
    }

    #[test]
    fn singular_matrix_has_no_covariance() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(invert_spd(&a).is_none());

        let b = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let inv = invert_spd(&b).unwrap();
        assert!((inv[(0, 0)] - 0.5).abs() < 1e-15);
        assert!((inv[(1, 1)] - 0.25).abs() < 1e-15);
    }
}
