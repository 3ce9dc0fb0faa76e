//! Fit inputs.
//!
//! - `source`: columns, weighting and sample extraction
//! - `histogram`: binned sources built from raw values
//! - `synthetic`: seeded random samples for demos

pub mod histogram;
pub mod source;
pub mod synthetic;

pub use histogram::*;
pub use source::*;
pub use synthetic::*;
