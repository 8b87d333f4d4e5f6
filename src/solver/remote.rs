//! Delegation of a solve to a remote solving service.
//!
//! The model is posted as JSON to `<endpoint>/solve` and the service replies
//! with a status and, when optimal, one value per column. Infinite bounds are
//! encoded as absent fields, since JSON has no representation for them. The
//! request timeout is the solve deadline: an expired request surfaces as
//! [`SolveStatus::TimedOut`], any other transport or protocol failure as a
//! [`SolverError`] naming the endpoint.
use super::{SolveResult, SolveStatus, SolverBackend, SolverError, SolverOptions};
use crate::model::{ConstraintModel, LinearConstraint, VariableDef};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct WireVariable {
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
    objective: f64,
    integer: bool,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct WireConstraint {
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
    terms: Vec<(usize, f64)>,
}

#[derive(Debug, Serialize)]
struct SolveRequest {
    backend: String,
    threads: u32,
    mip_gap: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_limit_secs: Option<f64>,
    variables: Vec<WireVariable>,
    constraints: Vec<WireConstraint>,
}

#[derive(Debug, Deserialize)]
struct SolveResponse {
    status: SolveStatus,
    #[serde(default)]
    values: Option<Vec<f64>>,
}

/// A bound suitable for the wire: `None` stands for unbounded.
fn encode_bound(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn encode_variable(var: &VariableDef) -> WireVariable {
    WireVariable {
        min: encode_bound(var.min),
        max: encode_bound(var.max),
        objective: var.objective,
        integer: var.integer,
    }
}

fn encode_constraint(row: &LinearConstraint) -> WireConstraint {
    WireConstraint {
        min: encode_bound(row.min),
        max: encode_bound(row.max),
        terms: row.terms.clone(),
    }
}

fn encode_request(
    model: &ConstraintModel,
    backend: SolverBackend,
    options: &SolverOptions,
) -> SolveRequest {
    SolveRequest {
        backend: backend.to_string(),
        threads: options.threads,
        mip_gap: options.mip_gap,
        time_limit_secs: options.time_limit.map(|limit| limit.as_secs_f64()),
        variables: model.variables.iter().map(encode_variable).collect(),
        constraints: model.constraints.iter().map(encode_constraint).collect(),
    }
}

/// Post the model to the remote service and map its reply.
pub(super) fn solve(
    model: &ConstraintModel,
    backend: SolverBackend,
    endpoint: &str,
    options: &SolverOptions,
) -> Result<SolveResult, SolverError> {
    let mode = format!("remote via {endpoint}");
    let err = |message: String| SolverError::new(backend, mode.clone(), message);

    let client = reqwest::blocking::Client::builder()
        .timeout(options.time_limit)
        .build()
        .map_err(|e| err(format!("could not build HTTP client: {e}")))?;

    let url = format!("{}/solve", endpoint.trim_end_matches('/'));
    debug!("submitting model to {url}");

    let response = match client
        .post(&url)
        .json(&encode_request(model, backend, options))
        .send()
    {
        Ok(response) => response,
        Err(e) if e.is_timeout() => return Ok(SolveResult::unsolved(SolveStatus::TimedOut)),
        Err(e) => return Err(err(format!("request failed: {e}"))),
    };

    let response = response
        .error_for_status()
        .map_err(|e| err(format!("service rejected the model: {e}")))?;

    let reply: SolveResponse = response
        .json()
        .map_err(|e| err(format!("unparsable response: {e}")))?;

    match reply.status {
        SolveStatus::Optimal => {
            let values = reply
                .values
                .ok_or_else(|| err("optimal response carried no variable values".into()))?;
            if values.len() != model.variables.len() {
                return Err(err(format!(
                    "expected {} variable values, got {}",
                    model.variables.len(),
                    values.len()
                )));
            }
            Ok(SolveResult::solved(values))
        }
        status => Ok(SolveResult::unsolved(status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinite_bounds_leave_the_wire() {
        let var = VariableDef {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            objective: 1.0,
            integer: false,
        };
        let wire = encode_variable(&var);
        assert_eq!(wire.min, None);
        assert_eq!(wire.max, None);
        let json = serde_json::to_string(&wire).unwrap();
        assert_eq!(json, r#"{"objective":1.0,"integer":false}"#);
    }

    #[test]
    fn test_finite_bounds_survive_encoding() {
        let row = LinearConstraint {
            min: 2.0,
            max: 2.0,
            terms: vec![(0, 1.0), (3, -5.0)],
        };
        let wire = encode_constraint(&row);
        assert_eq!(wire.min, Some(2.0));
        assert_eq!(wire.max, Some(2.0));
        assert_eq!(wire.terms, row.terms);
    }

    #[test]
    fn test_response_status_parsing() {
        let reply: SolveResponse = serde_json::from_str(r#"{"status":"timed_out"}"#).unwrap();
        assert_eq!(reply.status, SolveStatus::TimedOut);
        assert_eq!(reply.values, None);

        let reply: SolveResponse =
            serde_json::from_str(r#"{"status":"optimal","values":[1.0,2.5]}"#).unwrap();
        assert_eq!(reply.status, SolveStatus::Optimal);
        assert_eq!(reply.values, Some(vec![1.0, 2.5]));
    }

    #[test]
    fn test_unreachable_endpoint_is_a_solver_error() {
        let model = ConstraintModel {
            variables: Vec::new(),
            constraints: Vec::new(),
            layout: crate::model::VariableLayout::new(0, 0, 1, 1),
        };
        let result = solve(
            &model,
            SolverBackend::Highs,
            "http://127.0.0.1:1",
            &SolverOptions::default(),
        );
        let error = result.unwrap_err();
        assert!(error.mode.contains("remote"));
        assert!(error.mode.contains("127.0.0.1"));
    }
}
