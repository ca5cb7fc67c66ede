//! Finite-difference sensitivities with reservoir adjoint shortcuts.
//!
//! The engine evaluates one baseline case and one perturbed case per Real
//! decision variable. Each perturbed case runs on its own clone of the base
//! network, so the cases are independent and can run in parallel.
//!
//! A variable with adjoint records acts through the reservoir: instead of
//! changing the variable, the engine shifts the affected well streams by
//! `derivative * eps` and re-evaluates the surface network on top of them.
//! Any other variable is stepped directly.
//!
//! The step is `eps = (max - min) * perturbation_fraction`, forward unless
//! that would leave the upper bound, in which case it is taken backwards.
//! Variables with `max == min` get a zero derivative and no evaluation.

use crate::constraints::ConstraintSet;
use crate::evaluate::{Evaluation, Evaluator};
use flowline_core::{FlowError, FlowResult, Network, NodeIndex, VarId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Derivative of one well's stream at one schedule index with respect to a
/// decision variable, supplied by a reservoir adjoint run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjointRecord {
    pub well: NodeIndex,
    pub time_index: usize,
    pub variable: VarId,
    pub d_oil: f64,
    pub d_gas: f64,
    pub d_water: f64,
    pub d_pressure: f64,
}

/// Adjoint records grouped by variable.
#[derive(Debug, Clone, Default)]
pub struct AdjointTable {
    records: BTreeMap<VarId, Vec<AdjointRecord>>,
}

impl AdjointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: AdjointRecord) {
        self.records.entry(record.variable).or_default().push(record);
    }

    pub fn for_variable(&self, variable: VarId) -> &[AdjointRecord] {
        self.records
            .get(&variable)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has(&self, variable: VarId) -> bool {
        self.records.contains_key(&variable)
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<AdjointRecord> for AdjointTable {
    fn from_iter<I: IntoIterator<Item = AdjointRecord>>(iter: I) -> Self {
        let mut table = AdjointTable::new();
        for record in iter {
            table.insert(record);
        }
        table
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivitySettings {
    #[serde(default = "default_perturbation_fraction")]
    pub perturbation_fraction: f64,
    /// Evaluate perturbed cases on the rayon pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Worker threads, 0 for the rayon default
    #[serde(default)]
    pub threads: usize,
}

fn default_perturbation_fraction() -> f64 {
    0.001
}

fn default_parallel() -> bool {
    true
}

impl SensitivitySettings {
    /// The perturbation fraction must lie in `(0, 1]`, otherwise steps of a
    /// free variable collapse to zero.
    pub fn check(&self) -> FlowResult<()> {
        let fraction = self.perturbation_fraction;
        if fraction > 0.0 && fraction <= 1.0 {
            Ok(())
        } else {
            Err(FlowError::Config(format!(
                "perturbation fraction must be in (0, 1], got {fraction}"
            )))
        }
    }
}

impl Default for SensitivitySettings {
    fn default() -> Self {
        Self {
            perturbation_fraction: default_perturbation_fraction(),
            parallel: default_parallel(),
            threads: 0,
        }
    }
}

/// First-order derivatives keyed by variable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Derivatives {
    pub objective: BTreeMap<VarId, f64>,
    /// One map per constraint, in constraint order
    pub constraints: Vec<BTreeMap<VarId, f64>>,
}

/// A fully evaluated variable assignment. Never changed after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Case {
    assignment: BTreeMap<VarId, f64>,
    objective: f64,
    constraints: ConstraintSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    derivatives: Option<Derivatives>,
}

impl Case {
    fn from_evaluation(network: &Network, evaluation: Evaluation) -> Self {
        Self {
            assignment: network.variables.iter().map(|v| (v.id, v.value)).collect(),
            objective: evaluation.objective,
            constraints: evaluation.constraints,
            derivatives: None,
        }
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn assignment(&self) -> &BTreeMap<VarId, f64> {
        &self.assignment
    }

    pub fn value(&self, variable: VarId) -> Option<f64> {
        self.assignment.get(&variable).copied()
    }

    pub fn derivatives(&self) -> Option<&Derivatives> {
        self.derivatives.as_ref()
    }

    pub fn objective_derivative(&self) -> Option<&BTreeMap<VarId, f64>> {
        self.derivatives.as_ref().map(|d| &d.objective)
    }

    pub fn constraint_derivative(&self, index: usize) -> Option<&BTreeMap<VarId, f64>> {
        self.derivatives
            .as_ref()
            .and_then(|d| d.constraints.get(index))
    }
}

/// How a variable is perturbed.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    /// Set the variable to `value + eps`
    Direct { variable: VarId, eps: f64 },
    /// Shift well streams along the adjoint derivatives
    Adjoint { variable: VarId, eps: f64 },
    /// Degenerate bounds, derivative is zero
    Fixed { variable: VarId },
}

impl Step {
    fn variable(&self) -> VarId {
        match *self {
            Step::Direct { variable, .. }
            | Step::Adjoint { variable, .. }
            | Step::Fixed { variable } => variable,
        }
    }
}

pub struct SensitivityEngine {
    pub evaluator: Evaluator,
    pub settings: SensitivitySettings,
}

impl SensitivityEngine {
    pub fn new(evaluator: Evaluator, settings: SensitivitySettings) -> Self {
        Self {
            evaluator,
            settings,
        }
    }

    /// Evaluate a copy of `network` without derivatives.
    pub fn evaluate(&self, network: &Network) -> FlowResult<Case> {
        let mut work = network.clone();
        let evaluation = self.evaluator.evaluate(&mut work)?;
        Ok(Case::from_evaluation(network, evaluation))
    }

    /// Baseline case with objective and constraint derivatives.
    ///
    /// `network` is left untouched.
    pub fn run(&self, network: &Network, adjoints: &AdjointTable) -> FlowResult<Case> {
        self.settings.check()?;
        let mut baseline = self.evaluate(network)?;
        let steps = self.plan(network, adjoints);
        info!(
            variables = steps.len(),
            constraints = baseline.constraints.len(),
            "computing sensitivities"
        );

        let perturbed = self.evaluate_steps(network, adjoints, &steps)?;

        let mut derivatives = Derivatives {
            objective: BTreeMap::new(),
            constraints: vec![BTreeMap::new(); baseline.constraints.len()],
        };
        for (step, evaluation) in steps.iter().zip(perturbed) {
            let variable = step.variable();
            let Some(evaluation) = evaluation else {
                derivatives.objective.insert(variable, 0.0);
                for map in &mut derivatives.constraints {
                    map.insert(variable, 0.0);
                }
                continue;
            };
            let eps = match *step {
                Step::Direct { eps, .. } | Step::Adjoint { eps, .. } => eps,
                Step::Fixed { .. } => continue,
            };
            if evaluation.constraints.len() != baseline.constraints.len() {
                return Err(FlowError::Validation(format!(
                    "perturbing {variable} changed the constraint count from {} to {}",
                    baseline.constraints.len(),
                    evaluation.constraints.len()
                )));
            }
            derivatives
                .objective
                .insert(variable, (evaluation.objective - baseline.objective) / eps);
            for ((map, base), pert) in derivatives
                .constraints
                .iter_mut()
                .zip(baseline.constraints.iter())
                .zip(evaluation.constraints.iter())
            {
                map.insert(variable, (pert.value - base.value) / eps);
            }
        }
        baseline.derivatives = Some(derivatives);
        Ok(baseline)
    }

    fn plan(&self, network: &Network, adjoints: &AdjointTable) -> Vec<Step> {
        network
            .variables
            .continuous()
            .map(|var| {
                if !var.is_variable() {
                    return Step::Fixed { variable: var.id };
                }
                let mut eps = (var.max - var.min) * self.settings.perturbation_fraction;
                if var.value + eps > var.max {
                    eps = -eps;
                }
                if adjoints.has(var.id) {
                    Step::Adjoint {
                        variable: var.id,
                        eps,
                    }
                } else {
                    Step::Direct {
                        variable: var.id,
                        eps,
                    }
                }
            })
            .collect()
    }

    fn evaluate_steps(
        &self,
        network: &Network,
        adjoints: &AdjointTable,
        steps: &[Step],
    ) -> FlowResult<Vec<Option<Evaluation>>> {
        #[cfg(feature = "parallel")]
        if self.settings.parallel && steps.len() > 1 {
            use rayon::prelude::*;
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.settings.threads)
                .build()
                .map_err(|e| FlowError::Other(format!("building rayon thread pool: {e}")))?;
            return pool.install(|| {
                steps
                    .par_iter()
                    .map(|step| self.perturbed(network, adjoints, *step))
                    .collect()
            });
        }
        steps
            .iter()
            .map(|step| self.perturbed(network, adjoints, *step))
            .collect()
    }

    /// Evaluate one perturbation on a fresh copy of `network`.
    fn perturbed(
        &self,
        network: &Network,
        adjoints: &AdjointTable,
        step: Step,
    ) -> FlowResult<Option<Evaluation>> {
        let mut work = network.clone();
        match step {
            Step::Fixed { .. } => return Ok(None),
            Step::Direct { variable, eps } => {
                let value = work.variables.value(variable);
                if !work.variables.set_value(variable, value + eps) {
                    return Err(FlowError::UnknownVariable(variable.value()));
                }
            }
            Step::Adjoint { variable, eps } => {
                for record in adjoints.for_variable(variable) {
                    shift_well_stream(&mut work, record, eps)?;
                }
            }
        }
        debug!(?step, "evaluating perturbed case");
        self.evaluator.evaluate(&mut work).map(Some)
    }
}

fn shift_well_stream(network: &mut Network, record: &AdjointRecord, eps: f64) -> FlowResult<()> {
    if record.well.index() >= network.graph.node_count() || !network.node(record.well).is_well() {
        return Err(FlowError::Validation(format!(
            "adjoint record for {} does not refer to a well",
            record.variable
        )));
    }
    let node = network.node_mut(record.well);
    let len = node.streams().len();
    let label = node.label().to_string();
    let stream = node
        .streams_mut()
        .get_mut(record.time_index)
        .ok_or(FlowError::StreamIndex {
            component: label,
            index: record.time_index,
            len,
        })?;
    stream.oil_rate += record.d_oil * eps;
    stream.gas_rate += record.d_gas * eps;
    stream.water_rate += record.d_water * eps;
    stream.pressure += record.d_pressure * eps;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulation::CoupledModel;
    use crate::objective::{CumulativeOil, Objective, WellSeries};
    use flowline_core::{
        CostEvent, EndPipe, InstallCost, Node, PressureBooster, Schedule, Stream, UnitSystem,
        VariableKind, Well,
    };
    use std::sync::Arc;

    #[derive(Debug)]
    struct CapitalSpend;

    impl Objective for CapitalSpend {
        fn name(&self) -> &str {
            "capital_spend"
        }
        fn value(&self, _wells: &[WellSeries], costs: &[CostEvent]) -> f64 {
            costs.iter().map(|c| c.amount).sum()
        }
    }

    fn booster_network(value: f64) -> (Network, VarId, NodeIndex) {
        let mut net = Network::new(UnitSystem::Metric);
        let dp = net.variables.add_fixed("dp", 0.0);
        let cap = net.variables.add("capacity", VariableKind::Real, value, 0.0, 20.0);
        let well = net.add_node(Node::Well(Well::production("P1")));
        let booster = net.add_node(Node::Booster(PressureBooster::new("pump", dp, cap).with_cost(
            InstallCost {
                constant: 0.0,
                capacity_factor: 2.0,
                exponent: 1.0,
            },
        )));
        let end = net.add_node(Node::EndPipe(EndPipe::new("e", 50.0, UnitSystem::Metric)));
        net.connect_fixed(well, booster, 1.0);
        net.connect_fixed(booster, end, 1.0);
        net.initialize(Schedule::new(vec![1.0]).unwrap()).unwrap();
        net.set_well_streams(well, vec![Stream::new(1.0, 5.0, 0.0, 0.0, 100.0)])
            .unwrap();
        (net, cap, well)
    }

    fn engine(objective: Arc<dyn Objective>, parallel: bool) -> SensitivityEngine {
        SensitivityEngine::new(
            Evaluator::new(Arc::new(CoupledModel), objective),
            SensitivitySettings {
                perturbation_fraction: 0.1,
                parallel,
                threads: 2,
            },
        )
    }

    #[test]
    fn test_linear_objective_gradient() {
        let (net, cap, _) = booster_network(10.0);
        let case = engine(Arc::new(CapitalSpend), false)
            .run(&net, &AdjointTable::new())
            .unwrap();
        assert_eq!(case.objective(), 20.0);
        let d = case.objective_derivative().unwrap()[&cap];
        assert!((d - 2.0).abs() < 1e-9, "derivative {d}");
        // base network untouched
        assert_eq!(net.variables.value(cap), 10.0);
    }

    #[test]
    fn test_backward_step_at_upper_bound() {
        let (net, cap, _) = booster_network(20.0);
        let case = engine(Arc::new(CapitalSpend), false)
            .run(&net, &AdjointTable::new())
            .unwrap();
        let d = case.objective_derivative().unwrap()[&cap];
        assert!((d - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_variables_get_zero() {
        let (net, _, _) = booster_network(10.0);
        let dp = net.variables.by_name("dp").unwrap().id;
        let case = engine(Arc::new(CapitalSpend), false)
            .run(&net, &AdjointTable::new())
            .unwrap();
        assert_eq!(case.objective_derivative().unwrap()[&dp], 0.0);
        for j in 0..case.constraints().len() {
            assert_eq!(case.constraint_derivative(j).unwrap()[&dp], 0.0);
        }
    }

    #[test]
    fn test_booster_constraint_derivative() {
        let (net, cap, _) = booster_network(10.0);
        let case = engine(Arc::new(CapitalSpend), false)
            .run(&net, &AdjointTable::new())
            .unwrap();
        let idx = case
            .constraints()
            .iter()
            .position(|c| c.name == "booster:pump:0")
            .unwrap();
        // (c - 5) / c at c = 10 and c = 12
        let expected = ((12.0 - 5.0) / 12.0 - 0.5) / 2.0;
        let d = case.constraint_derivative(idx).unwrap()[&cap];
        assert!((d - expected).abs() < 1e-9);
    }

    #[test]
    fn test_adjoint_shifts_well_streams() {
        let mut net = Network::new(UnitSystem::Metric);
        let bhp = net.variables.add("bhp", VariableKind::Real, 100.0, 50.0, 250.0);
        let well = net.add_node(Node::Well(Well::production("P1")));
        let end = net.add_node(Node::EndPipe(EndPipe::new("e", 50.0, UnitSystem::Metric)));
        net.connect_fixed(well, end, 1.0);
        net.initialize(Schedule::new(vec![10.0]).unwrap()).unwrap();
        net.set_well_streams(well, vec![Stream::new(10.0, 100.0, 0.0, 0.0, 100.0)])
            .unwrap();

        let adjoints: AdjointTable = [AdjointRecord {
            well,
            time_index: 0,
            variable: bhp,
            d_oil: -0.5,
            d_gas: 0.0,
            d_water: 0.0,
            d_pressure: 1.0,
        }]
        .into_iter()
        .collect();

        let case = engine(Arc::new(CumulativeOil), false)
            .run(&net, &adjoints)
            .unwrap();
        // d(cum oil)/d(bhp) = d_oil * dt
        let d = case.objective_derivative().unwrap()[&bhp];
        assert!((d + 5.0).abs() < 1e-9, "derivative {d}");
        // the variable itself is not stepped
        assert_eq!(case.value(bhp), Some(100.0));
    }

    #[test]
    fn test_adjoint_record_out_of_range() {
        let (net, cap, well) = booster_network(10.0);
        let adjoints: AdjointTable = [AdjointRecord {
            well,
            time_index: 4,
            variable: cap,
            d_oil: 1.0,
            d_gas: 0.0,
            d_water: 0.0,
            d_pressure: 0.0,
        }]
        .into_iter()
        .collect();
        assert!(matches!(
            engine(Arc::new(CapitalSpend), false).run(&net, &adjoints),
            Err(FlowError::StreamIndex { index: 4, .. })
        ));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let (mut net, _, _) = booster_network(10.0);
        net.variables.add("spare", VariableKind::Real, 1.0, 0.0, 2.0);
        let adjoints = AdjointTable::new();
        let seq = engine(Arc::new(CapitalSpend), false)
            .run(&net, &adjoints)
            .unwrap();
        let par = engine(Arc::new(CapitalSpend), true)
            .run(&net, &adjoints)
            .unwrap();
        assert_eq!(seq.objective_derivative(), par.objective_derivative());
        assert_eq!(
            seq.derivatives().unwrap().constraints,
            par.derivatives().unwrap().constraints
        );
    }
}
