//! Fit models.
//!
//! - `builtin`: closed-form functions for the basic / peak / growth / distribution families
//! - `model`: `ModelDefinition`, the resolved model handed to the solver
//! - `registry`: static `(category, name)` lookup plus start-value heuristics

pub mod builtin;
pub mod model;
pub mod registry;

pub use builtin::*;
pub use model::*;
pub use registry::*;
