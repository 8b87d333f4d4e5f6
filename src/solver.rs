//! The solver gateway: hands a constraint model to a MILP backend and maps
//! the outcome back, hiding whether solving happens locally or on a remote
//! solving service.
use crate::model::ConstraintModel;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

mod local;
mod remote;

/// The closed set of supported solving backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SolverBackend {
    /// The HiGHS solver
    Highs,
}

impl fmt::Display for SolverBackend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Highs => write!(f, "highs"),
        }
    }
}

/// Where the solve is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Solve in-process, blocking the calling thread
    Local,
    /// Delegate to a remote solving service
    Remote {
        /// Base URL of the service
        endpoint: String,
    },
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote { endpoint } => write!(f, "remote via {endpoint}"),
        }
    }
}

/// Tuning parameters passed through to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// Number of solver threads
    pub threads: u32,
    /// Relative optimality gap at which the solve may stop
    pub mip_gap: f64,
    /// Wall-clock deadline; on expiry the solve returns [`SolveStatus::TimedOut`]
    pub time_limit: Option<Duration>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            mip_gap: 1e-9,
            time_limit: None,
        }
    }
}

/// The terminal status of a solve attempt.
///
/// `Infeasible` and `Unbounded` are valid outcomes, not failures; for a
/// validated dataset the model is always feasible, so seeing `Infeasible`
/// indicates a modelling bug upstream rather than bad input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// Solved to within the configured optimality gap
    Optimal,
    /// No feasible point exists
    Infeasible,
    /// The objective is unbounded below
    Unbounded,
    /// The deadline elapsed before the gap was reached
    TimedOut,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Optimal => "optimal",
            Self::Infeasible => "infeasible",
            Self::Unbounded => "unbounded",
            Self::TimedOut => "timed out",
        };
        write!(f, "{s}")
    }
}

/// The outcome of one solve. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    /// How the solve terminated
    pub status: SolveStatus,
    /// A value per column, in layout order; empty unless the status is
    /// [`SolveStatus::Optimal`]
    pub values: Vec<f64>,
}

impl SolveResult {
    /// An optimal result carrying variable values.
    pub fn solved(values: Vec<f64>) -> Self {
        Self {
            status: SolveStatus::Optimal,
            values,
        }
    }

    /// A terminal status with no solution attached.
    pub fn unsolved(status: SolveStatus) -> Self {
        Self {
            status,
            values: Vec::new(),
        }
    }
}

/// The backend was unreachable, crashed, or returned something unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{backend} backend failed ({mode}): {message}")]
pub struct SolverError {
    /// Which backend was selected
    pub backend: SolverBackend,
    /// Execution mode description, distinguishing local from remote failures
    pub mode: String,
    /// What went wrong
    pub message: String,
}

impl SolverError {
    fn new(backend: SolverBackend, mode: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend,
            mode: mode.into(),
            message: message.into(),
        }
    }
}

/// Solve a constraint model.
///
/// Blocking: the calling thread suspends until the backend returns or the
/// configured deadline elapses. The model is consumed; it is never reused
/// across solve attempts.
pub fn solve(
    model: ConstraintModel,
    backend: SolverBackend,
    mode: &ExecutionMode,
    options: &SolverOptions,
) -> Result<SolveResult, SolverError> {
    match mode {
        ExecutionMode::Local => match backend {
            SolverBackend::Highs => local::solve(model, options),
        },
        ExecutionMode::Remote { endpoint } => remote::solve(&model, backend, endpoint, options),
    }
}
