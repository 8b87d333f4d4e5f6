//! In-process solving with the HiGHS library.
use super::{SolveResult, SolveStatus, SolverBackend, SolverError, SolverOptions};
use crate::model::ConstraintModel;
use highs::{HighsModelStatus, RowProblem, Sense};
use log::debug;

/// Solve the model with HiGHS on the calling thread.
pub(super) fn solve(
    model: ConstraintModel,
    options: &SolverOptions,
) -> Result<SolveResult, SolverError> {
    let mut problem = RowProblem::default();

    let mut columns = Vec::with_capacity(model.variables.len());
    for var in &model.variables {
        let column = if var.integer {
            problem.add_integer_column(var.objective, var.min..=var.max)
        } else {
            problem.add_column(var.objective, var.min..=var.max)
        };
        columns.push(column);
    }

    for row in &model.constraints {
        let terms = row.terms.iter().map(|&(index, coeff)| (columns[index], coeff));
        problem.add_row(row.min..=row.max, terms);
    }

    let mut highs_model = problem.optimise(Sense::Minimise);
    apply_options(&mut highs_model, options);

    let solved = highs_model.solve();
    let status = solved.status();
    debug!("HiGHS finished with status {status:?}");

    match status {
        HighsModelStatus::Optimal => {
            Ok(SolveResult::solved(solved.get_solution().columns().to_vec()))
        }
        HighsModelStatus::Infeasible => Ok(SolveResult::unsolved(SolveStatus::Infeasible)),
        HighsModelStatus::Unbounded | HighsModelStatus::UnboundedOrInfeasible => {
            Ok(SolveResult::unsolved(SolveStatus::Unbounded))
        }
        HighsModelStatus::ReachedTimeLimit => Ok(SolveResult::unsolved(SolveStatus::TimedOut)),
        status => Err(SolverError::new(
            SolverBackend::Highs,
            "local",
            format!("unexpected solver status: {status:?}"),
        )),
    }
}

/// Apply tuning parameters to the HiGHS model before solving.
fn apply_options(model: &mut highs::Model, options: &SolverOptions) {
    model.set_option("threads", options.threads as i32);
    model.set_option("mip_rel_gap", options.mip_gap);
    if let Some(limit) = options.time_limit {
        model.set_option("time_limit", limit.as_secs_f64());
    }

    // HiGHS writes progress straight to the console rather than through our
    // logger, so only let it speak when debug logging is on.
    let verbose = log::log_enabled!(log::Level::Debug);
    model.set_option("output_flag", verbose);
    model.set_option("log_to_console", verbose);
}
