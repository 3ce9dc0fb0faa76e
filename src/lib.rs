//! `fit-curves` library crate.
//!
//! Nonlinear least-squares curve fitting: a small expression language for custom
//! models, a registry of built-in model families, a Levenberg–Marquardt solver
//! and fit sessions that pull samples from live columns or histograms.
//!
//! The binary (`fitc`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - hosts (plotting front ends, services) can embed `fit::FitSession` directly

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod expr;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
