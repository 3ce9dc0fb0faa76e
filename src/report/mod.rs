//! Reporting: formatted terminal output for fits and the model registry.

pub mod format;

pub use format::*;
