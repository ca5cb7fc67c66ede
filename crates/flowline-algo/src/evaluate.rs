//! One full evaluation of a network under its current variable assignment.

use crate::constraints::{network_constraints, user_constraints, ConstraintSet};
use crate::formulation::Formulation;
use crate::objective::{Objective, WellSeries};
use crate::pressure::solve_pressures;
use flowline_core::{Diagnostics, FlowResult, Network, NodeIndex};
use std::sync::Arc;
use tracing::debug;

/// Result of [`Evaluator::evaluate`].
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub objective: f64,
    pub constraints: ConstraintSet,
    pub diagnostics: Diagnostics,
    /// Components in the order their pressures were resolved: segments during
    /// the pressure solve, then production wells as their BHP constraints are
    /// evaluated.
    pub pressure_order: Vec<NodeIndex>,
}

/// Runs propagation, pressure solve, constraints and objective in sequence.
#[derive(Debug, Clone)]
pub struct Evaluator {
    pub formulation: Arc<dyn Formulation>,
    pub objective: Arc<dyn Objective>,
}

impl Evaluator {
    pub fn new(formulation: Arc<dyn Formulation>, objective: Arc<dyn Objective>) -> Self {
        Self {
            formulation,
            objective,
        }
    }

    /// Evaluate `network` in place.
    ///
    /// Streams are emptied first, so the same network can be evaluated
    /// repeatedly. Infeasible constraints are reported in the result; only
    /// structural problems abort.
    pub fn evaluate(&self, network: &mut Network) -> FlowResult<Evaluation> {
        let mut diagnostics = Diagnostics::new();

        network.empty_streams();
        self.formulation.propagate(network, &mut diagnostics)?;
        debug!(formulation = self.formulation.id(), "streams propagated");

        let mut pressure_order = solve_pressures(network, &mut diagnostics)?;

        let mut constraints = ConstraintSet::new();
        let wells = network_constraints(network, &mut constraints, &mut diagnostics)?;
        pressure_order.extend(wells);
        self.formulation.append_constraints(network, &mut constraints)?;
        user_constraints(network, &mut constraints)?;

        let wells = WellSeries::collect(network);
        let objective = self.objective.value(&wells, &network.cost_events());
        debug!(
            objective,
            constraints = constraints.len(),
            warnings = diagnostics.warning_count(),
            "evaluation complete"
        );

        Ok(Evaluation {
            objective,
            constraints,
            diagnostics,
            pressure_order,
        })
    }
}
