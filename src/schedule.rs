//! The top-level scheduling routine: validate a dataset, build the model,
//! solve it and map the solution back into schedule tables.
use crate::model::build_model;
use crate::output::{MapError, ScheduleOutput, ValidationError, map_solution};
use crate::solver::{
    ExecutionMode, SolveStatus, SolverBackend, SolverError, SolverOptions, solve,
};
use crate::system::{BusTopology, ModelBuildError, PowerSystem};
use log::info;
use thiserror::Error;

/// Everything configurable about a run, independent of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    /// Which solver to use
    pub backend: SolverBackend,
    /// Where the solve is executed
    pub mode: ExecutionMode,
    /// Whether line capacities constrain flows
    pub network_enabled: bool,
    /// Whether commitment decisions are binary rather than relaxed to [0, 1]
    pub commit_binary: bool,
    /// Tuning parameters passed through to the solver
    pub options: SolverOptions,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            backend: SolverBackend::Highs,
            mode: ExecutionMode::Local,
            network_enabled: true,
            commit_binary: true,
            options: SolverOptions::default(),
        }
    }
}

/// Any way a scheduling run can fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    /// The dataset was rejected before a model was built
    #[error("invalid dataset: {0}")]
    Build(#[from] ModelBuildError),
    /// The solver backend itself failed
    #[error(transparent)]
    Solver(#[from] SolverError),
    /// The solve terminated without an optimal solution
    #[error("solve terminated {0} with no solution")]
    Unsolved(SolveStatus),
    /// The solution failed re-validation against the model
    #[error("solution rejected: {0}")]
    Validation(#[from] ValidationError),
}

impl From<MapError> for ScheduleError {
    fn from(error: MapError) -> Self {
        match error {
            MapError::Unsolved(status) => Self::Unsolved(status),
            MapError::Validation(error) => Self::Validation(error),
        }
    }
}

/// Run the scheduler on a dataset.
///
/// Validates the dataset, builds the constraint model, solves it with the
/// configured backend and maps the solution into output tables. The run
/// either yields a complete, validated [`ScheduleOutput`] or an error; there
/// is no partial output.
pub fn run(
    system: &PowerSystem,
    config: &RunConfiguration,
) -> Result<ScheduleOutput, ScheduleError> {
    system.validate()?;
    info!(
        "Scheduling {} generators, {} lines, {} buses over {} periods",
        system.generators.len(),
        system.lines.len(),
        system.num_buses(),
        system.num_periods()
    );

    let topology = BusTopology::build(system);
    let model = build_model(system, &topology, config.commit_binary, config.network_enabled);
    let layout = model.layout;
    info!(
        "Model has {} variables and {} constraints; solving with {} ({})",
        model.variables.len(),
        model.constraints.len(),
        config.backend,
        config.mode
    );

    let result = solve(model, config.backend, &config.mode, &config.options)?;
    info!("Solve finished {}", result.status);

    let output = map_solution(
        system,
        &topology,
        &layout,
        &result,
        config.network_enabled,
        config.commit_binary,
    )?;
    info!("Total cost: {}", output.total_cost);
    Ok(output)
}
