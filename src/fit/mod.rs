//! Curve fitting.
//!
//! Responsibilities:
//!
//! - Levenberg–Marquardt solve with bounds, fixed parameters and statistics (`solver`)
//! - session state, start values, output series and result publication (`session`)

pub mod session;
pub mod solver;

pub use session::*;
pub use solver::*;
