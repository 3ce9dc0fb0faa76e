//! Input/output helpers.
//!
//! - JSON fit jobs (`job`)
//! - result JSON and curve CSV exports (`export`)

pub mod export;
pub mod job;

pub use export::*;
pub use job::*;
