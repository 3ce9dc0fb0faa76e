//! Application wiring (CLI dispatch, logging, exports).
//!
//! `main.rs` stays tiny; all I/O and command handling lives here.

use std::collections::HashMap;

use clap::Parser;

use crate::cli::{Cli, Command, DemoArgs, EvalArgs, FitArgs, ModelsArgs};
use crate::data::{Binning, NormalSampleSpec};
use crate::error::AppError;
use crate::expr::Expression;
use crate::models::registry;

pub mod pipeline;

/// Entry point for the `fitc` binary.
pub fn run() -> Result<(), AppError> {
    // A `.env` file may provide FITC_LOG_LEVEL before clap reads the environment.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(cli.log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Models(args) => handle_models(args),
        Command::Eval(args) => handle_eval(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let job = crate::io::read_job(&args.job)?;
    let result = pipeline::run_job(job)?;

    println!("{}", crate::report::format_fit_report(&result));

    if let Some(path) = &args.export_result {
        crate::io::write_result_json(path, &result)?;
    }
    if let Some(path) = &args.export_curve {
        crate::io::write_curve_csv(path, &result.output)?;
    }
    Ok(())
}

fn handle_models(args: ModelsArgs) -> Result<(), AppError> {
    print!("{}", crate::report::format_model_list(registry().entries(), args.category));
    Ok(())
}

fn handle_eval(args: EvalArgs) -> Result<(), AppError> {
    // Declared parameters are exactly the bound names, in binding order.
    let names: Vec<&str> = args.params.iter().map(|(n, _)| n.as_str()).collect();
    let expr = Expression::compile(&args.expr, &names)?;
    let bindings: HashMap<String, f64> = args.params.into_iter().collect();
    let y = expr.evaluate_named(&args.x, &bindings)?;

    println!("x,y");
    for (x, y) in args.x.iter().zip(y) {
        println!("{x},{y}");
    }
    Ok(())
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = pipeline::DemoConfig {
        sample: NormalSampleSpec {
            count: args.n,
            mean: args.mean,
            sd: args.sd,
            seed: args.seed,
        },
        binning: args.bins.map_or(Binning::Sturges, |bins| Binning::ByNumber { bins }),
        normalization: args.normalization,
    };
    let result = pipeline::run_demo(&config)?;

    println!("{}", crate::report::format_fit_report(&result));
    if let Some(path) = &args.export_curve {
        crate::io::write_curve_csv(path, &result.output)?;
    }
    Ok(())
}
