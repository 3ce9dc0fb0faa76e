//! Goodness-of-fit statistics.
//!
//! Conventions (n = samples, k = free parameters, dof = n − k):
//!
//! ```text
//! logLik = −n/2·ln(sse/n) − n/2·ln(2π) − n/2
//! AIC    = n·ln(sse/n) + 2(k+1) + n·ln(2π) + n
//! BIC    = n·ln(sse/n) + (k+1)·ln(n) + n + n·ln(2π)
//! R²     = 1 − sse/sst
//! R²adj  = 1 − (1 − R²)(n − 1)/(dof − 1)
//! ```
//!
//! The `+1` in AIC/BIC counts the residual variance as an estimated parameter,
//! which matches the "complete" formulas used by R's `logLik`-based criteria.
//!
//! Tail probabilities below [`P_VALUE_FLOOR`] are reported as exactly zero.

use statrs::distribution::{ChiSquared, ContinuousCDF, StudentsT};

use crate::domain::GoodnessOfFit;

/// p values below this are reported as 0.
pub const P_VALUE_FLOOR: f64 = 1e-9;

/// Two-sided Student-t p value for `t` with `dof` degrees of freedom.
pub fn t_p_value(t: f64, dof: f64) -> Option<f64> {
    if !(t.is_finite() && dof > 0.0) {
        return None;
    }
    let dist = StudentsT::new(0.0, 1.0, dof).ok()?;
    Some(floor_p(2.0 * dist.sf(t.abs())))
}

/// Half-width of the two-sided `1 − alpha` confidence interval for a parameter
/// with standard error `error`.
pub fn t_margin(alpha: f64, dof: f64, error: f64) -> Option<f64> {
    if error == 0.0 {
        return Some(0.0);
    }
    if !(dof > 0.0 && alpha > 0.0 && alpha < 1.0 && error.is_finite()) {
        return None;
    }
    let dist = StudentsT::new(0.0, 1.0, dof).ok()?;
    Some(dist.inverse_cdf(1.0 - alpha / 2.0) * error)
}

/// Upper chi-square tail probability of `sse` with `dof` degrees of freedom.
pub fn chisq_p_value(sse: f64, dof: f64) -> Option<f64> {
    if !(sse.is_finite() && dof > 0.0) {
        return None;
    }
    let dist = ChiSquared::new(dof).ok()?;
    Some(floor_p(dist.sf(sse)))
}

fn floor_p(p: f64) -> f64 {
    if p < P_VALUE_FLOOR { 0.0 } else { p }
}

/// Total sum of squares of `y` around `center`.
pub fn total_sum_of_squares(y: &[f64], center: f64) -> f64 {
    y.iter().map(|v| (v - center) * (v - center)).sum()
}

/// Compute all goodness-of-fit statistics for a finished fit.
///
/// `residuals` are the weighted residuals `√wᵢ·(yᵢ − f(xᵢ))`, `y` the observed
/// values, `free` the number of free parameters.
pub fn goodness_of_fit(residuals: &[f64], y: &[f64], free: usize) -> GoodnessOfFit {
    let n = residuals.len();
    let nf = n as f64;
    let k = free as f64;
    let sse: f64 = residuals.iter().map(|r| r * r).sum();
    let dof = n.saturating_sub(free);

    let (rms, rsd) = if dof > 0 {
        let rms = sse / dof as f64;
        (Some(rms), Some(rms.sqrt()))
    } else {
        (None, None)
    };

    let mse = if n > 0 { sse / nf } else { f64::NAN };
    let mae = if n > 0 {
        residuals.iter().map(|r| r.abs()).sum::<f64>() / nf
    } else {
        f64::NAN
    };

    // Models without an intercept can produce sse > sst around the mean; fall
    // back to the sum of squares around zero so R² stays in [0, 1].
    let mean = if n > 0 { y.iter().sum::<f64>() / nf } else { 0.0 };
    let mut sst = total_sum_of_squares(y, mean);
    if sst < sse {
        sst = total_sum_of_squares(y, 0.0);
    }

    let rsquare = if sst > 0.0 { Some(1.0 - sse / sst) } else { None };
    let rsquare_adj = match rsquare {
        Some(r2) if dof > 1 => Some(1.0 - (1.0 - r2) * (nf - 1.0) / (dof as f64 - 1.0)),
        _ => None,
    };

    let two_pi_ln = (2.0 * std::f64::consts::PI).ln();
    let ln_sse_n = (sse / nf).ln();
    let (log_lik, aic, bic) = if n > 0 && sse > 0.0 {
        (
            Some(-nf / 2.0 * ln_sse_n - nf / 2.0 * two_pi_ln - nf / 2.0),
            Some(nf * ln_sse_n + 2.0 * (k + 1.0) + nf * two_pi_ln + nf),
            Some(nf * ln_sse_n + (k + 1.0) * nf.ln() + nf + nf * two_pi_ln),
        )
    } else {
        (None, None, None)
    };

    GoodnessOfFit {
        n,
        dof,
        sse,
        rms,
        rsd,
        mse,
        rmse: mse.sqrt(),
        mae,
        sst,
        rsquare,
        rsquare_adj,
        chisq_p: chisq_p_value(sse, dof as f64),
        log_lik,
        aic,
        bic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn t_p_value_is_two_sided() {
        // t = 2.228 is the 97.5% quantile for 10 dof.
        let p = t_p_value(2.228, 10.0).unwrap();
        assert!((p - 0.05).abs() < 1e-3, "p = {p}");
        assert_eq!(t_p_value(1e6, 10.0), Some(0.0));
        assert_eq!(t_p_value(1.0, 0.0), None);
    }

    #[test]
    fn t_margin_uses_quantile() {
        let m = t_margin(0.05, 10.0, 1.0).unwrap();
        assert!((m - 2.228).abs() < 1e-3, "margin = {m}");
        assert_eq!(t_margin(0.05, 10.0, 0.0), Some(0.0));
    }

    #[test]
    fn perfect_fit_statistics() {
        let y = [2.0, 4.0, 6.0, 8.0];
        let residuals = [0.0; 4];
        let gof = goodness_of_fit(&residuals, &y, 2);
        assert_eq!(gof.dof, 2);
        assert_eq!(gof.sse, 0.0);
        assert_eq!(gof.rsquare, Some(1.0));
        assert_eq!(gof.log_lik, None);
    }

    #[test]
    fn rms_and_r2() {
        let y = [1.0, 2.0, 3.0, 4.0, 5.0];
        let residuals = [0.1, -0.1, 0.2, -0.2, 0.0];
        let gof = goodness_of_fit(&residuals, &y, 2);
        assert_relative_eq!(gof.sse, 0.1, epsilon = 1e-12);
        assert_relative_eq!(gof.rms.unwrap(), 0.1 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(gof.sst, 10.0, epsilon = 1e-12);
        assert_relative_eq!(gof.rsquare.unwrap(), 0.99, epsilon = 1e-12);
        assert_relative_eq!(gof.rsquare_adj.unwrap(), 1.0 - 0.01 * 4.0 / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn underdetermined_has_no_rms() {
        let gof = goodness_of_fit(&[0.5], &[1.0], 3);
        assert_eq!(gof.dof, 0);
        assert!(gof.rms.is_none());
        assert!(gof.chisq_p.is_none());
    }
}
