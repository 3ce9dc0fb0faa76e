//! Terminal formatting for fit results and the model registry.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{FitResult, ModelCategory};
use crate::models::RegistryEntry;

/// Format the full fit report: model, status, parameter table and diagnostics.
pub fn format_fit_report(result: &FitResult) -> String {
    let mut out = String::new();

    out.push_str("=== fitc - nonlinear least-squares fit ===\n");
    out.push_str(&format!("Model: {} / {}\n", result.category, result.model));
    out.push_str(&format!("f(x) = {}\n", result.equation));
    out.push_str(&format!(
        "Status: {} after {} iteration(s)\n",
        result.status, result.iterations
    ));

    out.push_str("\nParameters:\n");
    out.push_str(&format_parameter_table(result));

    let q = &result.quality;
    out.push_str("\nGoodness of fit:\n");
    out.push_str(&format!("  n={} dof={}\n", q.n, q.dof));
    out.push_str(&format!(
        "  SSE={} RMSE={} MAE={}\n",
        fmt_num(q.sse),
        fmt_num(q.rmse),
        fmt_num(q.mae)
    ));
    out.push_str(&format!(
        "  RMS={} RSD={} SST={}\n",
        fmt_opt(q.rms),
        fmt_opt(q.rsd),
        fmt_num(q.sst)
    ));
    out.push_str(&format!(
        "  R²={} adj. R²={} chi² p={}\n",
        fmt_opt(q.rsquare),
        fmt_opt(q.rsquare_adj),
        fmt_opt(q.chisq_p)
    ));
    out.push_str(&format!(
        "  logLik={} AIC={} BIC={}\n",
        fmt_opt(q.log_lik),
        fmt_opt(q.aic),
        fmt_opt(q.bic)
    ));

    if let Some(corr) = &result.correlation {
        if corr.len() > 1 {
            out.push_str("\nCorrelation (free parameters):\n");
            for row in corr {
                out.push_str(&format!("  {}\n", fmt_vec(row)));
            }
        }
    }

    out
}

fn format_parameter_table(result: &FitResult) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<12} {:>14} {:>12} {:>10} {:>10} {:>12} {:<6}\n",
            "name", "value", "std.error", "t", "p", "± margin", "flags"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<12} {:-<14} {:-<12} {:-<10} {:-<10} {:-<12} {:-<6}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for p in &result.parameters {
        let flags = match (p.fixed, p.at_bound) {
            (true, _) => "fixed",
            (false, true) => "bound",
            _ => "",
        };
        out.push_str(
            format!(
                "{:<12} {:>14} {:>12} {:>10} {:>10} {:>12} {:<6}\n",
                truncate(&p.name, 12),
                fmt_num(p.value),
                fmt_opt(p.std_error),
                fmt_opt(p.t_value),
                fmt_opt(p.p_value),
                fmt_opt(p.margin),
                flags,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Format the registry listing, optionally restricted to one category.
pub fn format_model_list(entries: &[RegistryEntry], category: Option<ModelCategory>) -> String {
    let mut out = String::new();
    for cat in ModelCategory::ALL {
        if category.is_some_and(|c| c != cat) || cat == ModelCategory::Custom {
            continue;
        }
        out.push_str(&format!("{cat}:\n"));
        for e in entries.iter().filter(|e| e.category == cat) {
            let degree = if e.kind.uses_degree() { " (degree)" } else { "" };
            out.push_str(&format!("  {:<20} {}{degree}\n", e.name, e.display_name));
        }
    }
    if category.is_none_or(|c| c == ModelCategory::Custom) {
        out.push_str("custom:\n  expression with user-declared parameters\n");
    }
    out
}

fn fmt_num(v: f64) -> String {
    if !v.is_finite() {
        return format!("{v}");
    }
    let a = v.abs();
    if a != 0.0 && !(1e-4..1e6).contains(&a) {
        format!("{v:.6e}")
    } else {
        format!("{v:.6}")
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(fmt_num).unwrap_or_else(|| "-".to_string())
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:>8.4}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitStatus, GoodnessOfFit, OutputSeries, ParameterEstimate};
    use crate::models::registry;

    fn sample_result() -> FitResult {
        FitResult {
            category: ModelCategory::Custom,
            model: "custom".to_string(),
            equation: "B0 + B1*x".to_string(),
            status: FitStatus::Converged,
            iterations: 3,
            ssr: 0.0,
            parameters: vec![
                ParameterEstimate {
                    name: "B0".to_string(),
                    value: 2.0,
                    std_error: Some(0.1),
                    t_value: Some(20.0),
                    p_value: Some(0.0),
                    margin: Some(0.43),
                    fixed: false,
                    at_bound: false,
                },
                ParameterEstimate {
                    name: "a_very_long_parameter_name".to_string(),
                    value: 1.5,
                    std_error: None,
                    t_value: None,
                    p_value: None,
                    margin: None,
                    fixed: true,
                    at_bound: false,
                },
            ],
            quality: GoodnessOfFit {
                n: 4,
                dof: 2,
                sse: 0.0,
                rms: Some(0.0),
                rsd: Some(0.0),
                mse: 0.0,
                rmse: 0.0,
                mae: 0.0,
                sst: 20.0,
                rsquare: Some(1.0),
                rsquare_adj: Some(1.0),
                chisq_p: Some(1.0),
                log_lik: None,
                aic: None,
                bic: None,
            },
            residuals: vec![0.0; 4],
            correlation: None,
            output: OutputSeries::default(),
        }
    }

    #[test]
    fn report_lists_parameters_and_status() {
        let report = format_fit_report(&sample_result());
        assert!(report.contains("Status: converged after 3 iteration(s)"));
        assert!(report.contains("f(x) = B0 + B1*x"));
        assert!(report.contains("a_very_long."));
        assert!(report.contains("fixed"));
        assert!(report.contains("logLik=- AIC=- BIC=-"));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(fmt_num(2.0), "2.000000");
        assert_eq!(fmt_num(1.5e-7), "1.500000e-7");
        assert_eq!(fmt_opt(None), "-");
        assert_eq!(truncate("abcdef", 4), "abc.");
    }

    #[test]
    fn model_list_by_category() {
        let all = format_model_list(registry().entries(), None);
        assert!(all.contains("distribution:"));
        assert!(all.contains("custom:"));

        let peaks = format_model_list(registry().entries(), Some(ModelCategory::Peak));
        assert!(peaks.contains("lorentz"));
        assert!(!peaks.contains("growth:"));
        assert!(!peaks.contains("custom:"));
    }
}
