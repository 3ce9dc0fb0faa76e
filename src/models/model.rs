//! Resolved model definitions.
//!
//! The solver relies on one primitive operation, `evaluate(x, params)`, and is
//! agnostic to whether the model is a closed-form built-in or a parsed custom
//! expression. Both are carried by [`ModelFunction`].

use crate::domain::{ModelCategory, Parameter};
use crate::error::{FitError, Result};
use crate::expr::Expression;
use crate::models::builtin::BuiltinModel;

/// The evaluable part of a model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelFunction {
    Builtin(BuiltinModel),
    Custom(Expression),
}

impl ModelFunction {
    pub fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        match self {
            ModelFunction::Builtin(m) => m.evaluate(x, params),
            ModelFunction::Custom(e) => e.evaluate(x, params),
        }
    }
}

/// A model resolved for one fit. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    category: ModelCategory,
    name: String,
    equation: String,
    parameter_names: Vec<String>,
    bounds: Vec<(f64, f64)>,
    function: ModelFunction,
}

impl ModelDefinition {
    pub fn builtin(category: ModelCategory, name: impl Into<String>, model: BuiltinModel) -> Self {
        Self {
            category,
            name: name.into(),
            equation: model.equation(),
            parameter_names: model.parameter_names(),
            bounds: model.default_bounds(),
            function: ModelFunction::Builtin(model),
        }
    }

    /// Compile a custom model.
    ///
    /// The identifiers used by `expression` must be exactly the declared
    /// `parameters`: an undeclared reference fails with `UnknownIdentifier`, a
    /// declared name the formula never uses fails with `UnusedParameter`.
    pub fn custom<S: AsRef<str>>(expression: &str, parameters: &[S]) -> Result<Self> {
        let expr = Expression::compile(expression, parameters)?;
        if let Some(unused) = expr.first_unused_parameter() {
            return Err(FitError::UnusedParameter(unused.to_string()));
        }
        let n = expr.parameter_names().len();
        Ok(Self {
            category: ModelCategory::Custom,
            name: "custom".to_string(),
            equation: expression.trim().to_string(),
            parameter_names: expr.parameter_names().to_vec(),
            bounds: vec![(f64::NEG_INFINITY, f64::INFINITY); n],
            function: ModelFunction::Custom(expr),
        })
    }

    pub fn category(&self) -> ModelCategory {
        self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn equation(&self) -> &str {
        &self.equation
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_names.len()
    }

    pub fn default_bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    pub fn function(&self) -> &ModelFunction {
        &self.function
    }

    pub fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        self.function.evaluate(x, params)
    }

    pub fn evaluate_all(&self, xs: &[f64], params: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.function.evaluate(x, params)).collect()
    }

    /// Parameters with the model's default bounds and the given start values.
    pub fn parameters_with_values(&self, values: &[f64]) -> Vec<Parameter> {
        self.parameter_names
            .iter()
            .zip(&self.bounds)
            .enumerate()
            .map(|(i, (name, &(lower, upper)))| {
                let value = values.get(i).copied().unwrap_or(1.0);
                Parameter::new(name.clone(), value).with_bounds(lower, upper)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::builtin::BuiltinKind;

    #[test]
    fn custom_requires_set_equal_parameters() {
        assert!(ModelDefinition::custom("B0 + B1*x", &["B1", "B0"]).is_ok());
        assert_eq!(
            ModelDefinition::custom("B0 + B1*x", &["B0", "B1", "B2"]).unwrap_err(),
            FitError::UnusedParameter("B2".to_string())
        );
        assert_eq!(
            ModelDefinition::custom("B0 + B1*x + B2*x^2 + B3*x^3", &["B0", "B1", "B2"]).unwrap_err(),
            FitError::UnknownIdentifier("B3".to_string())
        );
    }

    #[test]
    fn builtin_and_custom_share_one_contract() {
        let builtin = ModelDefinition::builtin(
            ModelCategory::Basic,
            "polynomial",
            BuiltinModel::new(BuiltinKind::Polynomial, 1),
        );
        let custom = ModelDefinition::custom("c0 + c1*x", &["c0", "c1"]).unwrap();
        let p = [2.0, 3.0];
        for x in [-1.0, 0.0, 2.5] {
            assert_eq!(builtin.evaluate(x, &p), custom.evaluate(x, &p));
        }
        assert_eq!(builtin.parameter_names(), custom.parameter_names());
    }

    #[test]
    fn parameters_carry_default_bounds() {
        let def = ModelDefinition::builtin(
            ModelCategory::Distribution,
            "gaussian",
            BuiltinModel::new(BuiltinKind::GaussianDist, 1),
        );
        let params = def.parameters_with_values(&[1.0, 2.0, 3.0]);
        assert_eq!(params[1].name, "s");
        assert_eq!(params[1].lower, 0.0);
        assert_eq!(params[2].value, 3.0);
    }
}
