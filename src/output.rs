//! Mapping a raw solution back into structured schedule tables, and writing
//! those tables to disk.
//!
//! Validation runs against the unrounded solver values; rounding to two
//! decimal places is applied only when the presentation tables are produced,
//! so it can never mask a constraint violation.
use crate::model::VariableLayout;
use crate::solver::{SolveResult, SolveStatus};
use crate::system::{BusTopology, PowerSystem};
use anyhow::{Context, Result};
use float_cmp::approx_eq;
use log::info;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "gridcommit_results";

/// Absolute tolerance for re-checking constraints on solver output
pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// Rounding precision applied to the output tables, in decimal places
const OUTPUT_PRECISION: u32 = 2;

/// A solved value violated one of the model's constraints.
///
/// The solver claims optimality, so any of these indicates a bug in model
/// construction or in the backend, not bad input data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Nodal energy balance does not hold
    #[error("energy balance violated at bus {bus}, period {period}: residual {residual:e}")]
    Balance {
        /// Bus index
        bus: usize,
        /// Period index
        period: usize,
        /// Imbalance between injections and withdrawals
        residual: f64,
    },
    /// Production is outside the committed range
    #[error(
        "production {production} outside commitment bounds for generator {generator}, \
         period {period} (commitment {commitment})"
    )]
    GenerationBounds {
        /// Generator index
        generator: usize,
        /// Period index
        period: usize,
        /// Production value
        production: f64,
        /// Commitment value
        commitment: f64,
    },
    /// A commitment value is fractional despite binary commitment
    #[error("commitment for generator {generator}, period {period} is not integral: {value}")]
    FractionalCommitment {
        /// Generator index
        generator: usize,
        /// Period index
        period: usize,
        /// The fractional value
        value: f64,
    },
    /// A flow exceeds the line capacity with network constraints enabled
    #[error("flow {flow} on line {line}, period {period} exceeds capacity {capacity}")]
    FlowCapacity {
        /// Line index
        line: usize,
        /// Period index
        period: usize,
        /// Flow value
        flow: f64,
        /// Line capacity
        capacity: f64,
    },
    /// A flow disagrees with the DC power-flow equation
    #[error(
        "flow {flow} on line {line}, period {period} inconsistent with angles (expected {expected})"
    )]
    FlowDefinition {
        /// Line index
        line: usize,
        /// Period index
        period: usize,
        /// Flow value
        flow: f64,
        /// Susceptance times the angle difference
        expected: f64,
    },
    /// Shedding exceeds the demand at a bus
    #[error("shed {value} at bus {bus}, period {period} exceeds demand {limit}")]
    ShedBound {
        /// Bus index
        bus: usize,
        /// Period index
        period: usize,
        /// Shed value
        value: f64,
        /// Demand at that bus and period
        limit: f64,
    },
    /// Spillage exceeds the available renewable output
    #[error("spill {value} at bus {bus}, period {period} exceeds renewable output {limit}")]
    SpillBound {
        /// Bus index
        bus: usize,
        /// Period index
        period: usize,
        /// Spill value
        value: f64,
        /// Renewable output at that bus and period
        limit: f64,
    },
    /// The reported objective cannot be reproduced from the solution
    #[error("objective mismatch: reported {reported}, recomputed {recomputed}")]
    Objective {
        /// Objective value reported by the solver
        reported: f64,
        /// Cost recomputed from production and shedding
        recomputed: f64,
    },
}

/// The mapper was given something it cannot produce output from.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    /// There is no solution to map
    #[error("no solution to map: solver finished {0}")]
    Unsolved(SolveStatus),
    /// The solution failed re-validation
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// The final, structured artifact of a scheduling run.
///
/// Tables are indexed `[entity][period]` and rounded for presentation; the
/// total cost is the solver's unrounded objective value.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOutput {
    /// Production per generator and period
    pub production: Vec<Vec<f64>>,
    /// Commitment per generator and period
    pub commitment: Vec<Vec<f64>>,
    /// Flow per line and period
    pub flow: Vec<Vec<f64>>,
    /// Shed demand per bus and period
    pub shed: Vec<Vec<f64>>,
    /// Spilled renewable output per bus and period
    pub spill: Vec<Vec<f64>>,
    /// Total production cost plus shedding penalty
    pub total_cost: f64,
}

/// Round a value to the output precision.
fn round_output(value: f64) -> f64 {
    let scale = 10f64.powi(OUTPUT_PRECISION as i32);
    (value * scale).round() / scale
}

/// Extract one `[entity][period]` table from the flat solution values.
fn extract_table(
    values: &[f64],
    num_entities: usize,
    num_periods: usize,
    column: impl Fn(usize, usize) -> usize,
) -> Vec<Vec<f64>> {
    (0..num_entities)
        .map(|i| {
            (0..num_periods)
                .map(|t| round_output(values[column(i, t)]))
                .collect()
        })
        .collect()
}

/// Turn a solve result into schedule tables.
///
/// Fails for any non-optimal status; there is no partial output. The
/// unrounded values are re-checked against every constraint of the model
/// before the rounded tables are produced.
pub fn map_solution(
    system: &PowerSystem,
    topology: &BusTopology,
    layout: &VariableLayout,
    result: &SolveResult,
    network_enabled: bool,
    commit_binary: bool,
) -> Result<ScheduleOutput, MapError> {
    if result.status != SolveStatus::Optimal {
        return Err(MapError::Unsolved(result.status));
    }

    validate_solution(
        system,
        topology,
        layout,
        &result.values,
        network_enabled,
        commit_binary,
    )?;

    let values = &result.values;
    let nt = layout.num_periods;
    Ok(ScheduleOutput {
        production: extract_table(values, layout.num_generators, nt, |g, t| {
            layout.production(g, t)
        }),
        commitment: extract_table(values, layout.num_generators, nt, |g, t| {
            layout.commitment(g, t)
        }),
        flow: extract_table(values, layout.num_lines, nt, |l, t| layout.flow(l, t)),
        shed: extract_table(values, layout.num_buses, nt, |b, t| layout.shed(b, t)),
        spill: extract_table(values, layout.num_buses, nt, |b, t| layout.spill(b, t)),
        total_cost: values[layout.total_cost()],
    })
}

/// Re-check every constraint of the model against unrounded solution values.
fn validate_solution(
    system: &PowerSystem,
    topology: &BusTopology,
    layout: &VariableLayout,
    values: &[f64],
    network_enabled: bool,
    commit_binary: bool,
) -> Result<(), ValidationError> {
    let tol = FEASIBILITY_TOLERANCE;

    for bus in 0..layout.num_buses {
        for period in 0..layout.num_periods {
            let injections: f64 = topology.generators[bus]
                .iter()
                .map(|&g| values[layout.production(g, period)])
                .sum::<f64>()
                + system.renewable.get(bus, period)
                + values[layout.shed(bus, period)]
                + topology.inbound[bus]
                    .iter()
                    .map(|&l| values[layout.flow(l, period)])
                    .sum::<f64>();
            let withdrawals: f64 = system.demand.get(bus, period)
                + values[layout.spill(bus, period)]
                + topology.outbound[bus]
                    .iter()
                    .map(|&l| values[layout.flow(l, period)])
                    .sum::<f64>();
            let residual = injections - withdrawals;
            if !approx_eq!(f64, residual, 0.0, epsilon = tol) {
                return Err(ValidationError::Balance {
                    bus,
                    period,
                    residual,
                });
            }

            let shed = values[layout.shed(bus, period)];
            let demand = system.demand.get(bus, period);
            if shed < -tol || shed > demand + tol {
                return Err(ValidationError::ShedBound {
                    bus,
                    period,
                    value: shed,
                    limit: demand,
                });
            }
            let spill = values[layout.spill(bus, period)];
            let renewable = system.renewable.get(bus, period);
            if spill < -tol || spill > renewable + tol {
                return Err(ValidationError::SpillBound {
                    bus,
                    period,
                    value: spill,
                    limit: renewable,
                });
            }
        }
    }

    for (g, generator) in system.generators.iter().enumerate() {
        for period in 0..layout.num_periods {
            let production = values[layout.production(g, period)];
            let commitment = values[layout.commitment(g, period)];
            if commitment < -tol
                || commitment > 1.0 + tol
                || production < commitment * generator.min_output - tol
                || production > commitment * generator.max_output + tol
            {
                return Err(ValidationError::GenerationBounds {
                    generator: g,
                    period,
                    production,
                    commitment,
                });
            }
            if commit_binary && !approx_eq!(f64, commitment, commitment.round(), epsilon = tol) {
                return Err(ValidationError::FractionalCommitment {
                    generator: g,
                    period,
                    value: commitment,
                });
            }
        }
    }

    for (l, line) in system.lines.iter().enumerate() {
        for period in 0..layout.num_periods {
            let flow = values[layout.flow(l, period)];
            let expected = line.susceptance
                * (values[layout.angle(line.from, period)] - values[layout.angle(line.to, period)]);
            if !approx_eq!(f64, flow, expected, epsilon = tol) {
                return Err(ValidationError::FlowDefinition {
                    line: l,
                    period,
                    flow,
                    expected,
                });
            }
            if network_enabled && flow.abs() > line.capacity + tol {
                return Err(ValidationError::FlowCapacity {
                    line: l,
                    period,
                    flow,
                    capacity: line.capacity,
                });
            }
        }
    }

    let mut recomputed = 0.0;
    for (g, generator) in system.generators.iter().enumerate() {
        for period in 0..layout.num_periods {
            recomputed += generator.cost * values[layout.production(g, period)];
        }
    }
    for bus in 0..layout.num_buses {
        for period in 0..layout.num_periods {
            recomputed += system.shed_cost * values[layout.shed(bus, period)];
        }
    }
    let reported = values[layout.total_cost()];
    let objective_tol = tol * reported.abs().max(1.0);
    if !approx_eq!(f64, reported, recomputed, epsilon = objective_tol) {
        return Err(ValidationError::Objective {
            reported,
            recomputed,
        });
    }

    Ok(())
}

/// A row of the production or commitment output files.
#[derive(Serialize)]
struct GeneratorRow {
    generator: usize,
    period: usize,
    value: f64,
}

/// A row of the flow output file.
#[derive(Serialize)]
struct LineRow {
    line: usize,
    period: usize,
    value: f64,
}

/// A row of the shed or spill output files.
#[derive(Serialize)]
struct BusRow {
    bus: usize,
    period: usize,
    value: f64,
}

/// Get the default output directory for the model at `model_dir`.
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    let model_dir = model_dir
        .canonicalize()
        .context("Could not resolve path to model")?;
    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Write one output table as a long-form CSV file.
fn write_table<R: Serialize>(
    path: &Path,
    table: &[Vec<f64>],
    make_row: impl Fn(usize, usize, f64) -> R,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Could not create {}", path.display()))?;
    for (entity, series) in table.iter().enumerate() {
        for (period, &value) in series.iter().enumerate() {
            writer.serialize(make_row(entity, period, value))?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write all schedule tables to CSV files in `output_dir`, creating it first
/// if necessary.
pub fn write_csv(output: &ScheduleOutput, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Could not create {}", output_dir.display()))?;

    let generator_row = |generator, period, value| GeneratorRow {
        generator,
        period,
        value,
    };
    write_table(&output_dir.join("production.csv"), &output.production, generator_row)?;
    write_table(&output_dir.join("commitment.csv"), &output.commitment, generator_row)?;
    write_table(&output_dir.join("flow.csv"), &output.flow, |line, period, value| LineRow {
        line,
        period,
        value,
    })?;
    let bus_row = |bus, period, value| BusRow { bus, period, value };
    write_table(&output_dir.join("shed.csv"), &output.shed, bus_row)?;
    write_table(&output_dir.join("spill.csv"), &output.spill, bus_row)?;

    info!("Results written to {}", output_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::build_model;
    use crate::system::{Generator, Line, Profile};

    /// One generator at bus 0, one line to bus 1, one period.
    fn two_bus_fixture() -> (PowerSystem, BusTopology, VariableLayout) {
        let system = PowerSystem {
            generators: vec![Generator {
                bus: 0,
                cost: 1.0,
                min_output: 0.0,
                max_output: 50.0,
            }],
            lines: vec![Line {
                from: 0,
                to: 1,
                susceptance: 5.0,
                capacity: 3.0,
            }],
            demand: Profile::new(2, 1, vec![0.0, 2.0]),
            renewable: Profile::filled(2, 1, 0.0),
            shed_cost: 1000.0,
        };
        let topology = BusTopology::build(&system);
        let layout = build_model(&system, &topology, true, true).layout;
        (system, topology, layout)
    }

    /// A hand-built optimal solution for [`two_bus_fixture`]: the generator
    /// sends 2 units over the line to cover the demand at bus 1.
    fn feasible_values(layout: &VariableLayout) -> Vec<f64> {
        let mut values = vec![0.0; layout.num_columns()];
        values[layout.total_cost()] = 2.0;
        values[layout.production(0, 0)] = 2.0;
        values[layout.commitment(0, 0)] = 1.0;
        values[layout.flow(0, 0)] = 2.0;
        // flow = susceptance * (angle_from - angle_to)
        values[layout.angle(1, 0)] = -0.4;
        values
    }

    #[test]
    fn test_round_output() {
        assert_eq!(round_output(1.0049), 1.0);
        assert_eq!(round_output(2.346), 2.35);
        assert_eq!(round_output(-2.718), -2.72);
    }

    #[test]
    fn test_map_rejects_unsolved_status() {
        let (system, topology, layout) = two_bus_fixture();
        for status in [
            SolveStatus::Infeasible,
            SolveStatus::Unbounded,
            SolveStatus::TimedOut,
        ] {
            let result = SolveResult::unsolved(status);
            let mapped = map_solution(&system, &topology, &layout, &result, true, true);
            assert_eq!(mapped, Err(MapError::Unsolved(status)));
        }
    }

    #[test]
    fn test_map_accepts_consistent_solution() {
        let (system, topology, layout) = two_bus_fixture();
        let result = SolveResult::solved(feasible_values(&layout));
        let output = map_solution(&system, &topology, &layout, &result, true, true).unwrap();
        assert_eq!(output.production, vec![vec![2.0]]);
        assert_eq!(output.commitment, vec![vec![1.0]]);
        assert_eq!(output.flow, vec![vec![2.0]]);
        assert_eq!(output.shed, vec![vec![0.0], vec![0.0]]);
        assert_eq!(output.total_cost, 2.0);
    }

    #[test]
    fn test_validation_catches_balance_violation() {
        let (system, topology, layout) = two_bus_fixture();
        let mut values = feasible_values(&layout);
        values[layout.production(0, 0)] = 3.0; // injects more than the line carries away
        let result = SolveResult::solved(values);
        let mapped = map_solution(&system, &topology, &layout, &result, true, true);
        assert!(matches!(
            mapped,
            Err(MapError::Validation(ValidationError::Balance { bus: 0, .. }))
        ));
    }

    #[test]
    fn test_validation_catches_fractional_commitment() {
        let (system, topology, layout) = two_bus_fixture();
        let mut values = feasible_values(&layout);
        values[layout.commitment(0, 0)] = 0.5;
        let result = SolveResult::solved(values);
        let mapped = map_solution(&system, &topology, &layout, &result, true, true);
        assert!(matches!(
            mapped,
            Err(MapError::Validation(
                ValidationError::FractionalCommitment { .. }
            ))
        ));
        // The same value is fine under relaxed commitment
        assert!(map_solution(&system, &topology, &layout, &result, true, false).is_ok());
    }

    #[test]
    fn test_validation_catches_flow_inconsistent_with_angles() {
        let (system, topology, layout) = two_bus_fixture();
        let mut values = feasible_values(&layout);
        values[layout.angle(1, 0)] = 0.0;
        let result = SolveResult::solved(values);
        let mapped = map_solution(&system, &topology, &layout, &result, true, true);
        assert!(matches!(
            mapped,
            Err(MapError::Validation(ValidationError::FlowDefinition { .. }))
        ));
    }

    #[test]
    fn test_validation_catches_capacity_violation_only_when_network_enabled() {
        let (system, topology, layout) = two_bus_fixture();
        let mut values = feasible_values(&layout);
        // Push 4 units over a 3-unit line, keeping everything else consistent
        values[layout.production(0, 0)] = 4.0;
        values[layout.flow(0, 0)] = 4.0;
        values[layout.angle(1, 0)] = -0.8;
        values[layout.shed(0, 0)] = 0.0;
        values[layout.spill(1, 0)] = 0.0;
        values[layout.total_cost()] = 4.0;
        // Bus 1 receives 4 but demand is 2; shed nothing, spill nothing, so
        // rebalance by raising demand-side withdrawal via spill is not
        // possible. Use a copy of the system with matching demand instead.
        let mut system = system;
        system.demand = Profile::new(2, 1, vec![0.0, 4.0]);
        let result = SolveResult::solved(values);

        let constrained = map_solution(&system, &topology, &layout, &result, true, true);
        assert!(matches!(
            constrained,
            Err(MapError::Validation(ValidationError::FlowCapacity { .. }))
        ));
        let copper_plate = map_solution(&system, &topology, &layout, &result, false, true);
        assert!(copper_plate.is_ok());
    }

    #[test]
    fn test_validation_catches_objective_mismatch() {
        let (system, topology, layout) = two_bus_fixture();
        let mut values = feasible_values(&layout);
        values[layout.total_cost()] = 99.0;
        let result = SolveResult::solved(values);
        let mapped = map_solution(&system, &topology, &layout, &result, true, true);
        assert!(matches!(
            mapped,
            Err(MapError::Validation(ValidationError::Objective { .. }))
        ));
    }

    #[test]
    fn test_write_csv_produces_all_tables() {
        let output = ScheduleOutput {
            production: vec![vec![2.0]],
            commitment: vec![vec![1.0]],
            flow: vec![vec![2.0]],
            shed: vec![vec![0.0], vec![0.0]],
            spill: vec![vec![0.0], vec![0.0]],
            total_cost: 2.0,
        };
        let dir = tempfile::tempdir().unwrap();
        write_csv(&output, dir.path()).unwrap();
        for name in ["production", "commitment", "flow", "shed", "spill"] {
            let path = dir.path().join(format!("{name}.csv"));
            assert!(path.is_file(), "missing {name}.csv");
        }
        let produced = fs::read_to_string(dir.path().join("production.csv")).unwrap();
        assert_eq!(produced, "generator,period,value\n0,0,2.0\n");
    }
}
