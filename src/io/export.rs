//! Export fit results.
//!
//! - result JSON: the full `FitResult` plus run metadata
//! - curve CSV: the output series, easy to consume in spreadsheets or plotting scripts

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{FitResult, OutputSeries};
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct ResultFile<'a> {
    tool: &'static str,
    version: &'static str,
    exported_at: DateTime<Utc>,
    result: &'a FitResult,
}

/// Write a result JSON file.
pub fn write_result_json(path: &Path, result: &FitResult) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create result JSON '{}': {e}", path.display())))?;

    let doc = ResultFile {
        tool: "fitc",
        version: env!("CARGO_PKG_VERSION"),
        exported_at: Utc::now(),
        result,
    };
    serde_json::to_writer_pretty(file, &doc)
        .map_err(|e| AppError::new(2, format!("Failed to write result JSON: {e}")))?;

    Ok(())
}

/// Write the fitted curve as `x,y` CSV.
pub fn write_curve_csv(path: &Path, series: &OutputSeries) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create curve CSV '{}': {e}", path.display())))?;

    writeln!(file, "x,y").map_err(|e| AppError::new(2, format!("Failed to write curve CSV header: {e}")))?;
    for (x, y) in series.x.iter().zip(&series.y) {
        writeln!(file, "{x:.10},{y:.10}")
            .map_err(|e| AppError::new(2, format!("Failed to write curve CSV row: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_csv_round_trips_through_text() {
        let path = std::env::temp_dir().join(format!("fitc-curve-{}.csv", std::process::id()));
        let series = OutputSeries {
            x: vec![0.0, 0.5],
            y: vec![1.0, 2.25],
        };
        write_curve_csv(&path, &series).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["x,y", "0.0000000000,1.0000000000", "0.5000000000,2.2500000000"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let path = Path::new("/nonexistent-dir-for-fitc/out.csv");
        let err = write_curve_csv(path, &OutputSeries::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
