//! Routines for loading a power-system dataset from a folder of CSV files.
//!
//! A model folder contains four files:
//!
//! * `generators.csv`: one row per generating unit
//! * `lines.csv`: one row per transmission line
//! * `demand.csv`: one column per bus, one row per time period
//! * `renewable.csv`: same shape as `demand.csv`
//!
//! The bus count of the system is defined by the number of columns in the
//! demand table.
use crate::system::{Generator, Line, PowerSystem, Profile};
use anyhow::{Context, Result, ensure};
use log::info;
use serde::de::DeserializeOwned;
use std::path::Path;

/// The file listing the generating units
const GENERATORS_FILE_NAME: &str = "generators.csv";
/// The file listing the transmission lines
const LINES_FILE_NAME: &str = "lines.csv";
/// The demand table
const DEMAND_FILE_NAME: &str = "demand.csv";
/// The renewable output table
const RENEWABLE_FILE_NAME: &str = "renewable.csv";

/// Read a series of type `T`s from a CSV file. An empty file yields an empty
/// vector; a system with no generators or lines is a valid dataset.
fn read_vec_from_csv<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(file_path)
        .with_context(|| format!("Could not open {}", file_path.display()))?;

    let mut vec = Vec::new();
    for result in reader.deserialize() {
        let record: T =
            result.with_context(|| format!("Error reading {}", file_path.display()))?;
        vec.push(record);
    }

    Ok(vec)
}

/// Read a bus-by-period table from a wide CSV file.
///
/// The header row defines the buses; each subsequent row holds the values for
/// one time period, in bus order.
fn read_profile(file_path: &Path) -> Result<Profile> {
    let mut reader = csv::Reader::from_path(file_path)
        .with_context(|| format!("Could not open {}", file_path.display()))?;

    let num_buses = reader
        .headers()
        .with_context(|| format!("Error reading {}", file_path.display()))?
        .len();

    let mut values = Vec::new();
    let mut num_periods = 0;
    for result in reader.deserialize() {
        let row: Vec<f64> =
            result.with_context(|| format!("Error reading {}", file_path.display()))?;
        ensure!(
            row.len() == num_buses,
            "Row {} of {} has {} values but the header names {} buses",
            num_periods + 1,
            file_path.display(),
            row.len(),
            num_buses
        );
        values.extend(row);
        num_periods += 1;
    }

    Ok(Profile::new(num_buses, num_periods, values))
}

/// Load a complete dataset from the model folder at `model_dir`.
///
/// The shed cost is a run parameter rather than part of the dataset, so it is
/// supplied by the caller. The returned system has not yet been validated.
pub fn load_system(model_dir: &Path, shed_cost: f64) -> Result<PowerSystem> {
    let generators: Vec<Generator> = read_vec_from_csv(&model_dir.join(GENERATORS_FILE_NAME))?;
    let lines: Vec<Line> = read_vec_from_csv(&model_dir.join(LINES_FILE_NAME))?;
    let demand = read_profile(&model_dir.join(DEMAND_FILE_NAME))?;
    let renewable = read_profile(&model_dir.join(RENEWABLE_FILE_NAME))?;

    info!(
        "Loaded model from {}: {} generators, {} lines, {} buses, {} periods",
        model_dir.display(),
        generators.len(),
        lines.len(),
        demand.num_buses(),
        demand.num_periods()
    );

    Ok(PowerSystem {
        generators,
        lines,
        demand,
        renewable,
        shed_cost,
    })
}
