//! CSV and JSON export of a run's results.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::error::SimError;
use crate::sim::series::SimulationSeries;
use crate::sim::types::StepResult;

/// Fixed leading columns; one `charge_<id>_wh` column per vehicle follows.
const HEADER: &[&str] = &[
    "time_index",
    "time_min",
    "voltage_pu",
    "solar_w",
    "wind_w",
    "price_per_wh",
    "vehicles_charging",
    "regime",
    "setpoint_w",
    "storage_soc_wh",
    "budget",
    "to_vehicles_wh",
    "bought_wh",
    "sold_wh",
];

/// Exports step results to a CSV file at the given path.
///
/// # Errors
///
/// Returns an error if file creation or writing fails.
pub fn export_csv(results: &[StepResult], series: &SimulationSeries, path: &Path) -> Result<(), SimError> {
    let file = File::create(path)?;
    write_csv(results, series, io::BufWriter::new(file))
}

/// Writes one row per step to any writer.
///
/// Vehicle charge columns hold the level reached at the end of the step
/// (trace index `t + 1`). Produces identical output for identical inputs.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_csv(results: &[StepResult], series: &SimulationSeries, writer: impl Write) -> Result<(), SimError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let vehicle_columns = series.vehicle_ids.iter().map(|id| format!("charge_{id}_wh"));
    let header: Vec<String> = HEADER
        .iter()
        .map(|h| h.to_string())
        .chain(vehicle_columns)
        .collect();
    wtr.write_record(&header)?;

    for r in results {
        let mut row = vec![
            r.time_index.to_string(),
            format!("{:.1}", r.time_min),
            format!("{:.6}", r.voltage_pu),
            format!("{:.3}", r.solar_w),
            format!("{:.3}", r.wind_w),
            format!("{:.9}", r.price_per_wh),
            r.vehicles_charging.to_string(),
            r.regime.label().to_string(),
            format!("{:.3}", r.setpoint_w),
            format!("{:.3}", r.storage_soc_wh),
            format!("{:.6}", r.budget),
            format!("{:.3}", r.ledger.to_vehicles_wh),
            format!("{:.3}", r.ledger.bought_wh),
            format!("{:.3}", r.ledger.sold_wh),
        ];
        row.extend(
            series
                .charge_traces
                .iter()
                .map(|trace| format!("{:.3}", trace.get(r.time_index + 1).copied().unwrap_or(0.0))),
        );
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports the full time series as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if file creation, serialization, or writing fails.
pub fn export_json(series: &SimulationSeries, path: &Path) -> Result<(), SimError> {
    let file = File::create(path)?;
    write_json(series, io::BufWriter::new(file))
}

/// Writes the full time series as JSON to any writer.
pub fn write_json(series: &SimulationSeries, mut writer: impl Write) -> Result<(), SimError> {
    serde_json::to_writer_pretty(&mut writer, series)?;
    writer.flush()?;
    Ok(())
}
