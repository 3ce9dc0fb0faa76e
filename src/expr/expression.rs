//! Compiled expressions.
//!
//! An [`Expression`] is parsed once (per fit session) and then evaluated many times
//! by the solver. Parameter references are resolved to slot indices at compile time,
//! so evaluation does no name lookups and no allocation per point.

use std::collections::HashMap;

use crate::error::{FitError, Result};
use crate::expr::lexer::tokenize;
use crate::expr::parser::{Node, Parser};

/// A parsed formula over `x` and an ordered list of named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    parameters: Vec<String>,
    referenced: Vec<bool>,
    root: Node,
}

impl Expression {
    /// Parse `source` against the declared `parameters`.
    ///
    /// Parameter names must be unique identifiers other than `x`. Declared names
    /// shadow the constants `pi` and `e`.
    pub fn compile<S: AsRef<str>>(source: &str, parameters: &[S]) -> Result<Self> {
        let parameters: Vec<String> = parameters.iter().map(|p| p.as_ref().to_string()).collect();
        validate_parameter_names(&parameters)?;

        let tokens = tokenize(source)?;
        let (root, referenced) = Parser::new(&tokens, &parameters).parse()?;

        Ok(Self {
            source: source.to_string(),
            parameters,
            referenced,
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Declared parameter names, in slot order.
    pub fn parameter_names(&self) -> &[String] {
        &self.parameters
    }

    /// Declared parameters the formula actually uses.
    pub fn referenced_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .zip(&self.referenced)
            .filter(|(_, used)| **used)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// First declared parameter the formula never references, if any.
    pub fn first_unused_parameter(&self) -> Option<&str> {
        self.parameters
            .iter()
            .zip(&self.referenced)
            .find(|(_, used)| !**used)
            .map(|(name, _)| name.as_str())
    }

    /// Evaluate at a single `x`. `values` follow [`Self::parameter_names`] order;
    /// a missing slot evaluates to NaN.
    pub fn evaluate(&self, x: f64, values: &[f64]) -> f64 {
        self.root.eval(x, values)
    }

    pub fn evaluate_all(&self, xs: &[f64], values: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.root.eval(x, values)).collect()
    }

    /// Evaluate over `xs` with parameters bound by name.
    pub fn evaluate_named(&self, xs: &[f64], binding: &HashMap<String, f64>) -> Result<Vec<f64>> {
        let values = self
            .parameters
            .iter()
            .map(|name| {
                binding
                    .get(name)
                    .copied()
                    .ok_or_else(|| FitError::UnknownIdentifier(name.clone()))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(self.evaluate_all(xs, &values))
    }
}

pub(crate) fn validate_parameter_names(names: &[String]) -> Result<()> {
    for (i, name) in names.iter().enumerate() {
        let mut chars = name.chars();
        let valid = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(FitError::invalid(format!("'{name}' is not a valid parameter name")));
        }
        if name == "x" {
            return Err(FitError::invalid("'x' is the independent variable and cannot be a parameter"));
        }
        if names[..i].contains(name) {
            return Err(FitError::invalid(format!("parameter '{name}' is declared twice")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn eval(source: &str, x: f64) -> f64 {
        Expression::compile::<&str>(source, &[]).unwrap().evaluate(x, &[])
    }

    #[test]
    fn precedence_and_associativity() {
        assert_abs_diff_eq!(eval("1 + 2 * 3", 0.0), 7.0);
        assert_abs_diff_eq!(eval("(1 + 2) * 3", 0.0), 9.0);
        assert_abs_diff_eq!(eval("2 ^ 3 ^ 2", 0.0), 512.0);
        assert_abs_diff_eq!(eval("2 ** 3", 0.0), 8.0);
        assert_abs_diff_eq!(eval("-x^2", 3.0), -9.0);
        assert_abs_diff_eq!(eval("2^-1", 0.0), 0.5);
        assert_abs_diff_eq!(eval("8 / 4 / 2", 0.0), 1.0);
        assert_abs_diff_eq!(eval("10 - 4 - 3", 0.0), 3.0);
    }

    #[test]
    fn constants_and_functions() {
        assert_abs_diff_eq!(eval("cos(pi)", 0.0), -1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(eval("ln(e)", 0.0), 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(eval("pow(2, 10)", 0.0), 1024.0);
        assert_abs_diff_eq!(eval("sqrt(abs(x))", -16.0), 4.0);
        assert_abs_diff_eq!(eval("erf(0)", 0.0), 0.0);
        assert_abs_diff_eq!(eval("max(x, 1)", 0.5), 1.0);
    }

    #[test]
    fn harmonic_expression_matches_closed_form() {
        let params = ["a0", "a1", "b1", "w"];
        let expr = Expression::compile("a0 + a1*cos(w*x) + b1*sin(w*x)", &params).unwrap();
        let values = [10.0, 2.0, -3.0, 0.5];
        let xs = [0.0, 0.7, 1.9, 4.2, 12.0];
        let ys = expr.evaluate_all(&xs, &values);
        for (x, y) in xs.iter().zip(ys) {
            let expected = 10.0 + 2.0 * (0.5 * x).cos() - 3.0 * (0.5 * x).sin();
            assert_abs_diff_eq!(y, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn gaussian_pdf_matches_closed_form() {
        let expr = Expression::compile("a/sqrt(2*pi)/s * exp(-((x-mu)/s)^2/2)", &["a", "s", "mu"]).unwrap();
        let values = [3.0, 1.5, -0.5];
        for &x in &[-3.0, -0.5, 0.0, 1.25, 4.0] {
            let z: f64 = (x + 0.5) / 1.5;
            let expected = 3.0 / (2.0 * std::f64::consts::PI).sqrt() / 1.5 * (-z * z / 2.0).exp();
            assert_abs_diff_eq!(expr.evaluate(x, &values), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn named_binding() {
        let expr = Expression::compile("B0 + B1*x", &["B0", "B1"]).unwrap();
        let binding = HashMap::from([("B0".to_string(), 2.0), ("B1".to_string(), 2.0)]);
        assert_eq!(expr.evaluate_named(&[0.0, 1.0, 2.0, 3.0], &binding).unwrap(), vec![2.0, 4.0, 6.0, 8.0]);

        let partial = HashMap::from([("B0".to_string(), 2.0)]);
        assert_eq!(
            expr.evaluate_named(&[0.0], &partial),
            Err(FitError::UnknownIdentifier("B1".to_string()))
        );
    }

    #[test]
    fn undeclared_identifier_is_rejected() {
        let err = Expression::compile("B0 + B1*x + B2*x^2 + B3*x^3", &["B0", "B1", "B2"]).unwrap_err();
        assert_eq!(err, FitError::UnknownIdentifier("B3".to_string()));

        let err = Expression::compile("foo(x)", &["a"]).unwrap_err();
        assert_eq!(err, FitError::UnknownIdentifier("foo".to_string()));
    }

    #[test]
    fn syntax_errors_report_position() {
        assert!(matches!(
            Expression::compile::<&str>("1 + * 2", &[]),
            Err(FitError::Parse { position: 4, .. })
        ));
        assert!(matches!(Expression::compile::<&str>("(x + 1", &[]), Err(FitError::Parse { .. })));
        assert!(matches!(Expression::compile::<&str>("x x", &[]), Err(FitError::Parse { position: 2, .. })));
        assert!(matches!(Expression::compile::<&str>("pow(x)", &[]), Err(FitError::Parse { .. })));
        assert!(matches!(Expression::compile::<&str>("", &[]), Err(FitError::Parse { .. })));
    }

    #[test]
    fn domain_errors_propagate_as_nan() {
        assert!(eval("ln(x)", -1.0).is_nan());
        assert!(eval("1/x", 0.0).is_infinite());
    }

    #[test]
    fn tracks_referenced_parameters() {
        let expr = Expression::compile("a*x", &["a", "b"]).unwrap();
        assert_eq!(expr.referenced_parameters(), vec!["a"]);
        assert_eq!(expr.first_unused_parameter(), Some("b"));
    }

    #[test]
    fn parameter_names_are_validated() {
        assert!(matches!(Expression::compile("x", &["x"]), Err(FitError::InvalidConfig(_))));
        assert!(matches!(Expression::compile("a", &["a", "a"]), Err(FitError::InvalidConfig(_))));
        assert!(matches!(Expression::compile("a", &["1a"]), Err(FitError::InvalidConfig(_))));
    }
}
