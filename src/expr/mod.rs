//! Restricted mathematical expression language for custom models.
//!
//! - `lexer`: source text -> tokens
//! - `parser`: tokens -> resolved tree (identifiers checked against the declared parameters)
//! - `expression`: the compiled, reusable [`Expression`]

mod lexer;
mod parser;

pub mod expression;

pub use expression::*;
