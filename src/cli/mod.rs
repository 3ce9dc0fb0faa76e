//! Command-line parsing for the `fitc` curve fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::data::HistogramNormalization;
use crate::domain::ModelCategory;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fitc", version, about = "Nonlinear least-squares curve fitter")]
pub struct Cli {
    /// Log verbosity.
    #[arg(long, global = true, value_enum, env = "FITC_LOG_LEVEL", default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a JSON fit job, print the report, and optionally export.
    Fit(FitArgs),
    /// List the registered models.
    Models(ModelsArgs),
    /// Evaluate an expression at a list of x values.
    Eval(EvalArgs),
    /// Fit a Gaussian to the histogram of a synthetic normal sample.
    Demo(DemoArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Fit job JSON file.
    #[arg(long, value_name = "JSON")]
    pub job: PathBuf,

    /// Export the full result (parameters, statistics, output series) to JSON.
    #[arg(long = "export-result")]
    pub export_result: Option<PathBuf>,

    /// Export the fitted curve to CSV.
    #[arg(long = "export-curve")]
    pub export_curve: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct ModelsArgs {
    /// Only list one category.
    #[arg(long, value_enum)]
    pub category: Option<ModelCategory>,
}

#[derive(Debug, Parser, Clone)]
pub struct EvalArgs {
    /// Expression in x and the bound parameters, e.g. "a*exp(-b*x)".
    #[arg(long)]
    pub expr: String,

    /// Parameter binding `name=value`; repeatable.
    #[arg(long = "param", value_parser = parse_binding)]
    pub params: Vec<(String, f64)>,

    /// Comma-separated x values.
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, default_value = "0")]
    pub x: Vec<f64>,
}

#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Number of samples to draw.
    #[arg(short = 'n', long, default_value_t = 10_000)]
    pub n: usize,

    /// Number of histogram bins (Sturges' rule if omitted).
    #[arg(long)]
    pub bins: Option<usize>,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Mean of the generated sample.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub mean: f64,

    /// Standard deviation of the generated sample.
    #[arg(long, default_value_t = 1.0)]
    pub sd: f64,

    /// Histogram normalization.
    #[arg(long, value_enum, default_value_t = HistogramNormalization::ProbabilityDensity)]
    pub normalization: HistogramNormalization,

    /// Export the fitted curve to CSV.
    #[arg(long = "export-curve")]
    pub export_curve: Option<PathBuf>,
}

/// Parse `name=value`.
fn parse_binding(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for '{}': {e}", name.trim()))?;
    Ok((name.trim().to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_eval_command() {
        let cli = Cli::parse_from([
            "fitc", "eval", "--expr", "a*x + b", "--param", "a=2", "--param", "b = -1", "--x", "0,1,-2",
        ]);
        let Command::Eval(args) = cli.command else {
            panic!("expected eval");
        };
        assert_eq!(args.params, vec![("a".to_string(), 2.0), ("b".to_string(), -1.0)]);
        assert_eq!(args.x, vec![0.0, 1.0, -2.0]);
    }

    #[test]
    fn parses_global_log_level_and_demo() {
        let cli = Cli::parse_from(["fitc", "demo", "--bins", "30", "--log-level", "debug"]);
        assert_eq!(cli.log_level, LogLevel::Debug);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.bins, Some(30));
        assert_eq!(args.n, 10_000);
    }

    #[test]
    fn rejects_bad_binding() {
        assert!(parse_binding("a").is_err());
        assert!(parse_binding("a=x").is_err());
    }
}
