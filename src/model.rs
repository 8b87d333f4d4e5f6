//! Construction of the constraint model for one scheduling run.
//!
//! The model is a flat, backend-agnostic representation: a list of bounded
//! columns (with objective coefficients and integrality markers) and a list
//! of sparse bounded rows. Construction is deterministic; the same dataset
//! and configuration always produce an identical model.
use crate::system::{BusTopology, PowerSystem};
use itertools::iproduct;

/// The definition of a decision variable.
///
/// A column takes values between `min` and `max` and contributes
/// `objective * value` to the quantity being minimised.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
    /// The variable's minimum value
    pub min: f64,
    /// The variable's maximum value
    pub max: f64,
    /// The coefficient of the variable in the objective
    pub objective: f64,
    /// Whether the variable is restricted to integer values
    pub integer: bool,
}

/// A linear constraint row of the form `min <= sum(coeff * var) <= max`.
///
/// Terms are sparse pairs of column index and coefficient; equality rows set
/// `min == max`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    /// The row's lower bound
    pub min: f64,
    /// The row's upper bound
    pub max: f64,
    /// Sparse (column index, coefficient) pairs
    pub terms: Vec<(usize, f64)>,
}

/// The column layout of the model.
///
/// Each decision quantity occupies a contiguous block of columns; the layout
/// records the offset of each block so that constraint generation and result
/// mapping agree on where every variable lives. Generator and line blocks are
/// generator-major / line-major, bus blocks are bus-major, with the period as
/// the fastest-varying index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableLayout {
    /// Number of generators
    pub num_generators: usize,
    /// Number of lines
    pub num_lines: usize,
    /// Number of buses
    pub num_buses: usize,
    /// Number of time periods
    pub num_periods: usize,
    production_offset: usize,
    commitment_offset: usize,
    shed_offset: usize,
    spill_offset: usize,
    angle_offset: usize,
    flow_offset: usize,
}

impl VariableLayout {
    /// Compute the layout for the given system dimensions.
    pub fn new(
        num_generators: usize,
        num_lines: usize,
        num_buses: usize,
        num_periods: usize,
    ) -> Self {
        let production_offset = 1; // column 0 is the total cost
        let commitment_offset = production_offset + num_generators * num_periods;
        let shed_offset = commitment_offset + num_generators * num_periods;
        let spill_offset = shed_offset + num_buses * num_periods;
        let angle_offset = spill_offset + num_buses * num_periods;
        let flow_offset = angle_offset + num_buses * num_periods;

        Self {
            num_generators,
            num_lines,
            num_buses,
            num_periods,
            production_offset,
            commitment_offset,
            shed_offset,
            spill_offset,
            angle_offset,
            flow_offset,
        }
    }

    /// The total number of columns in the model.
    pub fn num_columns(&self) -> usize {
        self.flow_offset + self.num_lines * self.num_periods
    }

    /// The column holding the total cost.
    pub fn total_cost(&self) -> usize {
        0
    }

    /// The column for production of generator `g` in period `t`.
    pub fn production(&self, g: usize, t: usize) -> usize {
        self.production_offset + g * self.num_periods + t
    }

    /// The column for the commitment decision of generator `g` in period `t`.
    pub fn commitment(&self, g: usize, t: usize) -> usize {
        self.commitment_offset + g * self.num_periods + t
    }

    /// The column for shed demand at bus `b` in period `t`.
    pub fn shed(&self, b: usize, t: usize) -> usize {
        self.shed_offset + b * self.num_periods + t
    }

    /// The column for spilled renewable output at bus `b` in period `t`.
    pub fn spill(&self, b: usize, t: usize) -> usize {
        self.spill_offset + b * self.num_periods + t
    }

    /// The column for the voltage phase angle at bus `b` in period `t`.
    pub fn angle(&self, b: usize, t: usize) -> usize {
        self.angle_offset + b * self.num_periods + t
    }

    /// The column for power flow on line `l` in period `t`.
    pub fn flow(&self, l: usize, t: usize) -> usize {
        self.flow_offset + l * self.num_periods + t
    }
}

/// The complete constraint model for one run.
///
/// Owned by exactly one run: built fresh from the dataset and configuration,
/// consumed once by the solver gateway, then discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintModel {
    /// Column definitions, in layout order
    pub variables: Vec<VariableDef>,
    /// Constraint rows
    pub constraints: Vec<LinearConstraint>,
    /// The column layout, needed to map the solution back to entities
    pub layout: VariableLayout,
}

/// A continuous column with the given bounds and no objective coefficient.
fn continuous(min: f64, max: f64) -> VariableDef {
    VariableDef {
        min,
        max,
        objective: 0.0,
        integer: false,
    }
}

/// Build the constraint model for a validated system.
///
/// With `commit_binary` the on/off decision of each unit is a binary column,
/// otherwise it is relaxed to the interval [0, 1]. With `network_enabled`
/// every flow column is bounded by the line capacity; without it flows are
/// unbounded (a copper-plate network), but the DC flow equations stay active
/// so flows remain physically consistent with the angles.
///
/// The model is feasible for any validated dataset: shedding can absorb all
/// demand at every bus, spilling can absorb all renewable output, and leaving
/// every unit decommitted is always admissible.
pub fn build_model(
    system: &PowerSystem,
    topology: &BusTopology,
    commit_binary: bool,
    network_enabled: bool,
) -> ConstraintModel {
    let ng = system.generators.len();
    let nl = system.lines.len();
    let nb = system.num_buses();
    let nt = system.num_periods();
    let layout = VariableLayout::new(ng, nl, nb, nt);

    // Columns are pushed in the exact order the layout assigns them.
    let mut variables = Vec::with_capacity(layout.num_columns());

    // Total cost: free, and the only column in the objective
    variables.push(VariableDef {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
        objective: 1.0,
        integer: false,
    });

    // Production
    for _ in iproduct!(0..ng, 0..nt) {
        variables.push(continuous(0.0, f64::INFINITY));
    }

    // Commitment
    for _ in iproduct!(0..ng, 0..nt) {
        variables.push(VariableDef {
            min: 0.0,
            max: 1.0,
            objective: 0.0,
            integer: commit_binary,
        });
    }

    // Shedding, capped by the demand it offsets
    for (b, t) in iproduct!(0..nb, 0..nt) {
        variables.push(continuous(0.0, system.demand.get(b, t)));
    }

    // Spillage, capped by the available renewable output
    for (b, t) in iproduct!(0..nb, 0..nt) {
        variables.push(continuous(0.0, system.renewable.get(b, t)));
    }

    // Angles are free
    for _ in iproduct!(0..nb, 0..nt) {
        variables.push(continuous(f64::NEG_INFINITY, f64::INFINITY));
    }

    // Flows, capacity-bounded only when the network constraints are on
    for (l, _) in iproduct!(0..nl, 0..nt) {
        let capacity = system.lines[l].capacity;
        if network_enabled {
            variables.push(continuous(-capacity, capacity));
        } else {
            variables.push(continuous(f64::NEG_INFINITY, f64::INFINITY));
        }
    }

    let mut constraints = Vec::with_capacity(1 + nb * nt + 2 * ng * nt + nl * nt);

    // Cost definition: total cost equals production cost plus shed penalty
    let mut terms = Vec::with_capacity(1 + ng * nt + nb * nt);
    terms.push((layout.total_cost(), 1.0));
    for (g, t) in iproduct!(0..ng, 0..nt) {
        terms.push((layout.production(g, t), -system.generators[g].cost));
    }
    for (b, t) in iproduct!(0..nb, 0..nt) {
        terms.push((layout.shed(b, t), -system.shed_cost));
    }
    constraints.push(LinearConstraint {
        min: 0.0,
        max: 0.0,
        terms,
    });

    // Nodal energy balance: injections at a bus equal withdrawals.
    // Renewable availability and demand are data, so they move to the RHS.
    for (b, t) in iproduct!(0..nb, 0..nt) {
        let mut terms = vec![(layout.shed(b, t), 1.0), (layout.spill(b, t), -1.0)];
        for &g in &topology.generators[b] {
            terms.push((layout.production(g, t), 1.0));
        }
        for &l in &topology.inbound[b] {
            terms.push((layout.flow(l, t), 1.0));
        }
        for &l in &topology.outbound[b] {
            terms.push((layout.flow(l, t), -1.0));
        }
        let rhs = system.demand.get(b, t) - system.renewable.get(b, t);
        constraints.push(LinearConstraint {
            min: rhs,
            max: rhs,
            terms,
        });
    }

    // Commitment bounds on production: committing a unit confines its output
    // to [min, max]; decommitting forces it to zero.
    for (g, t) in iproduct!(0..ng, 0..nt) {
        let generator = &system.generators[g];
        constraints.push(LinearConstraint {
            min: 0.0,
            max: f64::INFINITY,
            terms: vec![
                (layout.production(g, t), 1.0),
                (layout.commitment(g, t), -generator.min_output),
            ],
        });
        constraints.push(LinearConstraint {
            min: f64::NEG_INFINITY,
            max: 0.0,
            terms: vec![
                (layout.production(g, t), 1.0),
                (layout.commitment(g, t), -generator.max_output),
            ],
        });
    }

    // DC power flow: flow is proportional to the angle difference across the
    // line. Active regardless of the network toggle.
    for (l, t) in iproduct!(0..nl, 0..nt) {
        let line = &system.lines[l];
        constraints.push(LinearConstraint {
            min: 0.0,
            max: 0.0,
            terms: vec![
                (layout.flow(l, t), 1.0),
                (layout.angle(line.from, t), -line.susceptance),
                (layout.angle(line.to, t), line.susceptance),
            ],
        });
    }

    ConstraintModel {
        variables,
        constraints,
        layout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{Generator, Line, Profile};

    fn small_system() -> PowerSystem {
        PowerSystem {
            generators: vec![
                Generator {
                    bus: 0,
                    cost: 5.0,
                    min_output: 1.0,
                    max_output: 20.0,
                },
                Generator {
                    bus: 1,
                    cost: 8.0,
                    min_output: 0.0,
                    max_output: 10.0,
                },
            ],
            lines: vec![Line {
                from: 0,
                to: 1,
                susceptance: 5.0,
                capacity: 3.0,
            }],
            demand: Profile::new(2, 2, vec![4.0, 6.0, 2.0, 8.0]),
            renewable: Profile::new(2, 2, vec![0.0, 1.0, 0.0, 0.5]),
            shed_cost: 1000.0,
        }
    }

    fn small_model(commit_binary: bool, network_enabled: bool) -> ConstraintModel {
        let system = small_system();
        let topology = BusTopology::build(&system);
        build_model(&system, &topology, commit_binary, network_enabled)
    }

    #[test]
    fn test_layout_is_dense_and_disjoint() {
        let layout = VariableLayout::new(2, 1, 2, 2);
        let mut seen = vec![false; layout.num_columns()];
        seen[layout.total_cost()] = true;
        for g in 0..2 {
            for t in 0..2 {
                seen[layout.production(g, t)] = true;
                seen[layout.commitment(g, t)] = true;
            }
        }
        for b in 0..2 {
            for t in 0..2 {
                seen[layout.shed(b, t)] = true;
                seen[layout.spill(b, t)] = true;
                seen[layout.angle(b, t)] = true;
            }
        }
        for t in 0..2 {
            seen[layout.flow(0, t)] = true;
        }
        assert!(seen.iter().all(|&s| s), "layout must cover every column exactly once");
    }

    #[test]
    fn test_model_dimensions() {
        let model = small_model(true, true);
        // 1 cost + 2 production blocks of 2x2 + 3 bus blocks of 2x2 + 1 flow block of 1x2
        assert_eq!(model.variables.len(), 1 + 2 * 4 + 3 * 4 + 2);
        // 1 cost row + 4 balance rows + 8 commitment rows + 2 flow rows
        assert_eq!(model.constraints.len(), 1 + 4 + 8 + 2);
    }

    #[test]
    fn test_build_is_deterministic() {
        assert_eq!(small_model(true, true), small_model(true, true));
    }

    #[test]
    fn test_commitment_integrality_follows_configuration() {
        let binary = small_model(true, true);
        let relaxed = small_model(false, true);
        for (g, t) in iproduct!(0..2, 0..2) {
            let col = binary.layout.commitment(g, t);
            assert!(binary.variables[col].integer);
            assert!(!relaxed.variables[col].integer);
            assert_eq!(relaxed.variables[col].min, 0.0);
            assert_eq!(relaxed.variables[col].max, 1.0);
        }
    }

    #[test]
    fn test_network_toggle_controls_flow_bounds() {
        let constrained = small_model(true, true);
        let copper_plate = small_model(true, false);
        for t in 0..2 {
            let col = constrained.layout.flow(0, t);
            assert_eq!(constrained.variables[col].min, -3.0);
            assert_eq!(constrained.variables[col].max, 3.0);
            assert_eq!(copper_plate.variables[col].min, f64::NEG_INFINITY);
            assert_eq!(copper_plate.variables[col].max, f64::INFINITY);
        }
        // The DC flow equations are present either way
        assert_eq!(constrained.constraints.len(), copper_plate.constraints.len());
    }

    #[test]
    fn test_shed_and_spill_columns_capped_by_tables() {
        let system = small_system();
        let model = small_model(true, true);
        for (b, t) in iproduct!(0..2, 0..2) {
            let shed = &model.variables[model.layout.shed(b, t)];
            assert_eq!((shed.min, shed.max), (0.0, system.demand.get(b, t)));
            let spill = &model.variables[model.layout.spill(b, t)];
            assert_eq!((spill.min, spill.max), (0.0, system.renewable.get(b, t)));
        }
    }

    #[test]
    fn test_balance_row_uses_incident_entities_only() {
        let model = small_model(true, true);
        let layout = model.layout;
        // Balance rows follow the cost row, bus-major
        let row = &model.constraints[1];
        assert_eq!(row.min, 4.0);
        assert_eq!(row.max, 4.0);
        let columns: Vec<usize> = row.terms.iter().map(|&(col, _)| col).collect();
        assert!(columns.contains(&layout.production(0, 0)));
        assert!(!columns.contains(&layout.production(1, 0)));
        assert!(columns.contains(&layout.flow(0, 0)));
        assert!(columns.contains(&layout.shed(0, 0)));
        assert!(columns.contains(&layout.spill(0, 0)));
    }

    #[test]
    fn test_cost_row_covers_production_and_shedding() {
        let model = small_model(true, true);
        let row = &model.constraints[0];
        assert_eq!((row.min, row.max), (0.0, 0.0));
        assert_eq!(row.terms.len(), 1 + 2 * 2 + 2 * 2);
        assert_eq!(row.terms[0], (model.layout.total_cost(), 1.0));
        assert!(row.terms.contains(&(model.layout.production(0, 1), -5.0)));
        assert!(row.terms.contains(&(model.layout.shed(1, 0), -1000.0)));
    }
}
