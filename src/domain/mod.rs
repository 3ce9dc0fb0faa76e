//! Domain types used throughout the fitting pipeline.
//!
//! This module defines:
//!
//! - model selection (`ModelCategory`, `ModelSpec`)
//! - parameters and per-fit overrides (`Parameter`, `FitOverrides`, `SolverOptions`)
//! - sample sets and fit outputs (`SampleSet`, `FitResult`, `FitStatus`, ...)

pub mod types;

pub use types::*;
