//! The power-system dataset: generators, lines and bus-level time series.
//!
//! All indices are dense, zero-based and fixed for the lifetime of a
//! scheduling run. Buses are implicit; they are defined by the columns of the
//! demand and renewable tables.
use serde::Deserialize;
use thiserror::Error;

/// A thermal generating unit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Generator {
    /// The bus this unit injects power into
    pub bus: usize,
    /// Marginal cost per unit of production
    pub cost: f64,
    /// Minimum output while committed
    pub min_output: f64,
    /// Maximum output while committed
    pub max_output: f64,
}

/// A directed transmission line between two buses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Line {
    /// The bus the line originates at
    pub from: usize,
    /// The bus the line terminates at
    pub to: usize,
    /// Line susceptance for the DC power-flow model
    pub susceptance: f64,
    /// Maximum flow magnitude in either direction
    pub capacity: f64,
}

/// A bus-by-period table of quantities such as demand or renewable output.
///
/// Values are stored period-major, matching the CSV layout of one row per
/// time period with one column per bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    num_buses: usize,
    num_periods: usize,
    values: Vec<f64>,
}

impl Profile {
    /// Create a profile from period-major values.
    pub fn new(num_buses: usize, num_periods: usize, values: Vec<f64>) -> Self {
        assert_eq!(values.len(), num_buses * num_periods, "Profile shape mismatch");
        Self {
            num_buses,
            num_periods,
            values,
        }
    }

    /// Create a profile with the same value at every bus and period.
    pub fn filled(num_buses: usize, num_periods: usize, value: f64) -> Self {
        Self::new(num_buses, num_periods, vec![value; num_buses * num_periods])
    }

    /// The value for the given bus and time period.
    pub fn get(&self, bus: usize, period: usize) -> f64 {
        self.values[period * self.num_buses + bus]
    }

    /// The number of buses covered by this profile.
    pub fn num_buses(&self) -> usize {
        self.num_buses
    }

    /// The number of time periods covered by this profile.
    pub fn num_periods(&self) -> usize {
        self.num_periods
    }
}

/// An error found while checking the dataset, before any solve is attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelBuildError {
    /// The demand and renewable tables disagree about the system shape
    #[error(
        "demand table is {demand_buses} buses x {demand_periods} periods but renewable table \
         is {renewable_buses} buses x {renewable_periods} periods"
    )]
    ShapeMismatch {
        /// Buses in the demand table
        demand_buses: usize,
        /// Periods in the demand table
        demand_periods: usize,
        /// Buses in the renewable table
        renewable_buses: usize,
        /// Periods in the renewable table
        renewable_periods: usize,
    },
    /// The system has no buses or no time periods
    #[error("system must have at least one bus and one time period")]
    EmptySystem,
    /// A generator references a bus outside the system
    #[error("generator {index} references bus {bus} but the system has {num_buses} buses")]
    GeneratorBusOutOfRange {
        /// Generator index
        index: usize,
        /// The out-of-range bus
        bus: usize,
        /// Number of buses in the system
        num_buses: usize,
    },
    /// A line endpoint references a bus outside the system
    #[error("line {index} references bus {bus} but the system has {num_buses} buses")]
    LineBusOutOfRange {
        /// Line index
        index: usize,
        /// The out-of-range bus
        bus: usize,
        /// Number of buses in the system
        num_buses: usize,
    },
    /// A line connects a bus to itself
    #[error("line {index} connects bus {bus} to itself")]
    SelfLoop {
        /// Line index
        index: usize,
        /// The repeated endpoint
        bus: usize,
    },
    /// A generator has a negative cost or inconsistent output limits
    #[error("generator {index}: {reason}")]
    InvalidGenerator {
        /// Generator index
        index: usize,
        /// Description of the problem
        reason: String,
    },
    /// A line has negative capacity
    #[error("line {index} has negative capacity {capacity}")]
    NegativeCapacity {
        /// Line index
        index: usize,
        /// The offending capacity
        capacity: f64,
    },
    /// A demand or renewable entry is negative
    #[error("{table} value for bus {bus}, period {period} is negative ({value})")]
    NegativeEntry {
        /// Which table the entry belongs to
        table: &'static str,
        /// Bus index
        bus: usize,
        /// Period index
        period: usize,
        /// The offending value
        value: f64,
    },
    /// The shedding penalty is zero or negative
    #[error("shed cost must be positive, got {0}")]
    NonPositiveShedCost(f64),
}

/// The complete dataset for one scheduling run. Read-only once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSystem {
    /// Thermal generating units
    pub generators: Vec<Generator>,
    /// Transmission lines
    pub lines: Vec<Line>,
    /// Demand at each bus and period
    pub demand: Profile,
    /// Available renewable output at each bus and period
    pub renewable: Profile,
    /// Penalty cost per unit of shed demand
    pub shed_cost: f64,
}

impl PowerSystem {
    /// The number of buses in the system.
    pub fn num_buses(&self) -> usize {
        self.demand.num_buses()
    }

    /// The number of time periods in the system.
    pub fn num_periods(&self) -> usize {
        self.demand.num_periods()
    }

    /// Check the dataset for inconsistencies.
    ///
    /// Must succeed before the dataset can be turned into a constraint model.
    /// A system with no generators or no lines is valid; demand is then met
    /// (or shed) without them.
    pub fn validate(&self) -> Result<(), ModelBuildError> {
        if self.demand.num_buses() != self.renewable.num_buses()
            || self.demand.num_periods() != self.renewable.num_periods()
        {
            return Err(ModelBuildError::ShapeMismatch {
                demand_buses: self.demand.num_buses(),
                demand_periods: self.demand.num_periods(),
                renewable_buses: self.renewable.num_buses(),
                renewable_periods: self.renewable.num_periods(),
            });
        }

        let num_buses = self.num_buses();
        if num_buses == 0 || self.num_periods() == 0 {
            return Err(ModelBuildError::EmptySystem);
        }

        if self.shed_cost <= 0.0 {
            return Err(ModelBuildError::NonPositiveShedCost(self.shed_cost));
        }

        for (index, generator) in self.generators.iter().enumerate() {
            if generator.bus >= num_buses {
                return Err(ModelBuildError::GeneratorBusOutOfRange {
                    index,
                    bus: generator.bus,
                    num_buses,
                });
            }
            if generator.cost < 0.0 {
                return Err(ModelBuildError::InvalidGenerator {
                    index,
                    reason: format!("negative cost {}", generator.cost),
                });
            }
            if generator.min_output < 0.0 {
                return Err(ModelBuildError::InvalidGenerator {
                    index,
                    reason: format!("negative minimum output {}", generator.min_output),
                });
            }
            if generator.max_output < generator.min_output {
                return Err(ModelBuildError::InvalidGenerator {
                    index,
                    reason: format!(
                        "maximum output {} below minimum output {}",
                        generator.max_output, generator.min_output
                    ),
                });
            }
        }

        for (index, line) in self.lines.iter().enumerate() {
            for bus in [line.from, line.to] {
                if bus >= num_buses {
                    return Err(ModelBuildError::LineBusOutOfRange {
                        index,
                        bus,
                        num_buses,
                    });
                }
            }
            if line.from == line.to {
                return Err(ModelBuildError::SelfLoop {
                    index,
                    bus: line.from,
                });
            }
            if line.capacity < 0.0 {
                return Err(ModelBuildError::NegativeCapacity {
                    index,
                    capacity: line.capacity,
                });
            }
        }

        for (table, profile) in [("demand", &self.demand), ("renewable", &self.renewable)] {
            for bus in 0..num_buses {
                for period in 0..profile.num_periods() {
                    let value = profile.get(bus, period);
                    if value < 0.0 {
                        return Err(ModelBuildError::NegativeEntry {
                            table,
                            bus,
                            period,
                            value,
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

/// Per-bus adjacency lists, built once from the entity tables.
///
/// Constraint generation walks these lists instead of repeatedly scanning
/// every generator and line for membership, as the nodal balance equations
/// only involve the entities incident to each bus.
#[derive(Debug, Clone, PartialEq)]
pub struct BusTopology {
    /// For each bus, the indices of generators injecting into it
    pub generators: Vec<Vec<usize>>,
    /// For each bus, the indices of lines terminating at it
    pub inbound: Vec<Vec<usize>>,
    /// For each bus, the indices of lines originating at it
    pub outbound: Vec<Vec<usize>>,
}

impl BusTopology {
    /// Build adjacency lists for a validated system.
    pub fn build(system: &PowerSystem) -> Self {
        let num_buses = system.num_buses();
        let mut generators = vec![Vec::new(); num_buses];
        let mut inbound = vec![Vec::new(); num_buses];
        let mut outbound = vec![Vec::new(); num_buses];

        for (index, generator) in system.generators.iter().enumerate() {
            generators[generator.bus].push(index);
        }
        for (index, line) in system.lines.iter().enumerate() {
            outbound[line.from].push(index);
            inbound[line.to].push(index);
        }

        Self {
            generators,
            inbound,
            outbound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn two_bus_system() -> PowerSystem {
        PowerSystem {
            generators: vec![
                Generator {
                    bus: 0,
                    cost: 5.0,
                    min_output: 0.0,
                    max_output: 20.0,
                },
                Generator {
                    bus: 1,
                    cost: 8.0,
                    min_output: 2.0,
                    max_output: 10.0,
                },
            ],
            lines: vec![Line {
                from: 0,
                to: 1,
                susceptance: 5.0,
                capacity: 3.0,
            }],
            demand: Profile::filled(2, 3, 4.0),
            renewable: Profile::filled(2, 3, 0.5),
            shed_cost: 1000.0,
        }
    }

    #[test]
    fn test_profile_indexing() {
        // Two buses, two periods, period-major
        let profile = Profile::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(profile.get(0, 0), 1.0);
        assert_eq!(profile.get(1, 0), 2.0);
        assert_eq!(profile.get(0, 1), 3.0);
        assert_eq!(profile.get(1, 1), 4.0);
    }

    #[test]
    fn test_validate_accepts_well_formed_system() {
        assert_eq!(two_bus_system().validate(), Ok(()));
    }

    #[test]
    fn test_validate_accepts_system_without_generators_or_lines() {
        let mut system = two_bus_system();
        system.generators.clear();
        system.lines.clear();
        assert_eq!(system.validate(), Ok(()));
    }

    #[rstest]
    #[case::generator_bus_out_of_range(|s: &mut PowerSystem| s.generators[0].bus = 2)]
    #[case::negative_cost(|s: &mut PowerSystem| s.generators[0].cost = -1.0)]
    #[case::negative_min_output(|s: &mut PowerSystem| s.generators[1].min_output = -0.1)]
    #[case::max_below_min(|s: &mut PowerSystem| s.generators[1].max_output = 1.0)]
    #[case::line_bus_out_of_range(|s: &mut PowerSystem| s.lines[0].to = 9)]
    #[case::self_loop(|s: &mut PowerSystem| s.lines[0].to = 0)]
    #[case::negative_capacity(|s: &mut PowerSystem| s.lines[0].capacity = -3.0)]
    #[case::negative_demand(|s: &mut PowerSystem| s.demand = Profile::filled(2, 3, -1.0))]
    #[case::zero_shed_cost(|s: &mut PowerSystem| s.shed_cost = 0.0)]
    fn test_validate_rejects(#[case] corrupt: fn(&mut PowerSystem)) {
        let mut system = two_bus_system();
        corrupt(&mut system);
        assert!(system.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shape_mismatch() {
        let mut system = two_bus_system();
        system.renewable = Profile::filled(2, 4, 0.0);
        assert!(matches!(
            system.validate(),
            Err(ModelBuildError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_system() {
        let system = PowerSystem {
            generators: Vec::new(),
            lines: Vec::new(),
            demand: Profile::new(0, 0, Vec::new()),
            renewable: Profile::new(0, 0, Vec::new()),
            shed_cost: 1000.0,
        };
        assert_eq!(system.validate(), Err(ModelBuildError::EmptySystem));
    }

    #[test]
    fn test_topology_adjacency() {
        let topology = BusTopology::build(&two_bus_system());
        assert_eq!(topology.generators, vec![vec![0], vec![1]]);
        assert_eq!(topology.outbound, vec![vec![0], vec![]]);
        assert_eq!(topology.inbound, vec![vec![], vec![0]]);
    }
}
