//! Mathematical utilities: linear algebra for the normal equations, special
//! functions and fit statistics.

pub mod linalg;
pub mod stats;

pub use linalg::*;
pub use stats::*;

/// Error function (re-exported so model code does not depend on `statrs` paths).
pub fn erf(x: f64) -> f64 {
    statrs::function::erf::erf(x)
}

/// Complementary error function.
pub fn erfc(x: f64) -> f64 {
    statrs::function::erf::erfc(x)
}
