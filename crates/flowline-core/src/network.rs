//! The network container.
//!
//! [`Network`] owns the component graph, the decision variables, the schedule
//! and the constraint groups defined on top of the topology (capacities and
//! user constraints). It is built once, initialized with the schedule and then
//! reused for every evaluation: only variable values and stream contents change
//! between evaluations.

use crate::components::CostEvent;
use crate::diagnostics::Diagnostics;
use crate::error::{FlowError, FlowResult};
use crate::schedule::Schedule;
use crate::stream::Stream;
use crate::units::{Phase, UnitSystem};
use crate::variables::{VarId, VariableSet};
use crate::{Connection, Node};
use petgraph::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-phase rate ceiling over one or more feed pipes.
#[derive(Debug, Clone, Default)]
pub struct Capacity {
    pub name: String,
    pub feeds: Vec<NodeIndex>,
    pub max_oil: Option<f64>,
    pub max_gas: Option<f64>,
    pub max_water: Option<f64>,
    pub max_liquid: Option<f64>,
}

impl Capacity {
    pub fn new(name: impl Into<String>, feeds: Vec<NodeIndex>) -> Self {
        Self {
            name: name.into(),
            feeds,
            ..Self::default()
        }
    }

    /// Configured maxima as (label, maximum) pairs in a fixed order.
    pub fn limits(&self) -> Vec<(&'static str, f64)> {
        [
            ("oil", self.max_oil),
            ("gas", self.max_gas),
            ("water", self.max_water),
            ("liquid", self.max_liquid),
        ]
        .into_iter()
        .filter_map(|(label, max)| max.map(|m| (label, m)))
        .collect()
    }
}

/// Component property a user constraint can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    OilRate,
    GasRate,
    WaterRate,
    Pressure,
    /// Volume taken out by a separator
    RemovedVolume,
}

/// Signed, scaled reference to a named component property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    #[serde(default = "default_coefficient")]
    pub coefficient: f64,
    pub component: String,
    pub property: Property,
}

fn default_coefficient() -> f64 {
    1.0
}

/// Bounded linear combination of component properties at one schedule index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConstraint {
    pub name: String,
    pub time_index: usize,
    pub terms: Vec<Term>,
    pub min: f64,
    pub max: f64,
}

/// The surface network graph
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub graph: DiGraph<Node, Connection>,
    pub variables: VariableSet,
    pub schedule: Schedule,
    /// Unit system network streams are kept in
    pub units: UnitSystem,
    pub capacities: Vec<Capacity>,
    pub user_constraints: Vec<UserConstraint>,
    /// Superposed inflow per segment, filled only by the decoupled formulation
    pub superposed: HashMap<NodeIndex, Vec<Stream>>,
    names: HashMap<String, NodeIndex>,
}

impl Network {
    pub fn new(units: UnitSystem) -> Self {
        Self {
            units,
            ..Self::default()
        }
    }

    /// Add a component and claim ownership of its variables.
    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        let name = node.label().to_string();
        let owned: Vec<VarId> = match &node {
            Node::Well(w) => w
                .controls
                .iter()
                .map(|c| c.variable)
                .chain(w.install_time)
                .collect(),
            Node::Separator(s) => [s.remove_fraction, s.remove_capacity]
                .into_iter()
                .chain(s.install_time)
                .collect(),
            Node::Booster(b) => [b.pressure_increase, b.capacity]
                .into_iter()
                .chain(b.install_time)
                .collect(),
            Node::EndPipe(_) | Node::MidPipe(_) => Vec::new(),
        };
        let idx = self.graph.add_node(node);
        for var in owned {
            self.variables.set_owner(var, idx);
        }
        self.names.insert(name, idx);
        idx
    }

    /// Route `from` into `to` with a routing-fraction variable owned by `from`.
    pub fn connect(&mut self, from: NodeIndex, to: NodeIndex, routing: VarId) -> EdgeIndex {
        self.variables.set_owner(routing, from);
        self.graph.add_edge(from, to, Connection { routing })
    }

    /// Route with a fixed fraction.
    pub fn connect_fixed(&mut self, from: NodeIndex, to: NodeIndex, fraction: f64) -> EdgeIndex {
        let label = format!(
            "route:{}->{}",
            self.graph[from].label(),
            self.graph[to].label()
        );
        let var = self.variables.add_fixed(label, fraction);
        self.connect(from, to, var)
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.graph[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.graph[idx]
    }

    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.names.get(name).copied()
    }

    pub fn require(&self, name: &str) -> FlowResult<NodeIndex> {
        self.find(name)
            .ok_or_else(|| FlowError::UnknownComponent(name.to_string()))
    }

    pub fn label(&self, idx: NodeIndex) -> &str {
        self.graph[idx].label()
    }

    /// Outgoing connections as (receiver, routing variable), in insertion order.
    pub fn outlets(&self, idx: NodeIndex) -> Vec<(NodeIndex, VarId)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.id(), e.target(), e.weight().routing))
            .collect();
        edges.sort_by_key(|(id, _, _)| *id);
        edges.into_iter().map(|(_, n, v)| (n, v)).collect()
    }

    /// Incoming connections as (feeder, routing variable), in insertion order.
    pub fn feeders(&self, idx: NodeIndex) -> Vec<(NodeIndex, VarId)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.id(), e.source(), e.weight().routing))
            .collect();
        edges.sort_by_key(|(id, _, _)| *id);
        edges.into_iter().map(|(_, n, v)| (n, v)).collect()
    }

    /// The single outlet of a separator or booster.
    pub fn single_outlet(&self, idx: NodeIndex) -> FlowResult<(NodeIndex, VarId)> {
        self.outlets(idx)
            .into_iter()
            .next()
            .ok_or_else(|| FlowError::MissingOutlet(self.label(idx).to_string()))
    }

    pub fn production_wells(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .node_indices()
            .filter(|&i| matches!(&self.graph[i], Node::Well(w) if w.is_production()))
    }

    pub fn wells(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .node_indices()
            .filter(|&i| self.graph[i].is_well())
    }

    /// Pipes, separators and boosters.
    pub fn segments(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .node_indices()
            .filter(|&i| !self.graph[i].is_well())
    }

    /// Whether `idx` operates at schedule index `index`.
    pub fn is_installed(&self, idx: NodeIndex, index: usize) -> bool {
        self.variables
            .is_installed(self.graph[idx].install_time(), index)
    }

    /// Allocate streams for `schedule` on every component.
    pub fn initialize(&mut self, schedule: Schedule) -> FlowResult<()> {
        if schedule.is_empty() {
            return Err(FlowError::Validation("schedule has no entries".into()));
        }
        let units = self.units;
        for node in self.graph.node_weights_mut() {
            node.initialize(&schedule, units);
        }
        self.schedule = schedule;
        self.superposed.clear();
        Ok(())
    }

    /// Replace a well's streams with reservoir results.
    pub fn set_well_streams(&mut self, idx: NodeIndex, streams: Vec<Stream>) -> FlowResult<()> {
        let expected = self.schedule.len();
        let units = self.units;
        match &mut self.graph[idx] {
            Node::Well(well) => {
                if streams.len() != expected {
                    return Err(FlowError::ScheduleMismatch {
                        component: well.name.clone(),
                        expected,
                        found: streams.len(),
                    });
                }
                well.streams = streams.into_iter().map(|s| s.convert(units)).collect();
                Ok(())
            }
            other => Err(FlowError::Validation(format!(
                "'{}' is not a well",
                other.label()
            ))),
        }
    }

    /// Reset every pipe, separator and booster for a new evaluation.
    ///
    /// Well streams are inputs and stay untouched. Separator removal capacity
    /// is restored from its capacity variable.
    pub fn empty_streams(&mut self) {
        let capacities: Vec<(NodeIndex, f64)> = self
            .graph
            .node_indices()
            .filter_map(|i| match &self.graph[i] {
                Node::Separator(s) => Some((i, self.variables.value(s.remove_capacity))),
                _ => None,
            })
            .collect();
        for node in self.graph.node_weights_mut() {
            if !node.is_well() {
                node.empty_streams();
            }
        }
        for (idx, capacity) in capacities {
            if let Node::Separator(sep) = &mut self.graph[idx] {
                sep.reset_removal(capacity);
            }
        }
        self.superposed.clear();
    }

    /// Fail when any component's stream count differs from the schedule.
    pub fn check_schedule(&self) -> FlowResult<()> {
        let expected = self.schedule.len();
        for node in self.graph.node_weights() {
            let found = node.streams().len();
            if found != expected {
                return Err(FlowError::ScheduleMismatch {
                    component: node.label().to_string(),
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Capital costs of every installed component with a cost model.
    pub fn cost_events(&self) -> Vec<CostEvent> {
        let mut events = Vec::new();
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let (cost, capacity) = match node {
                Node::Well(w) => (w.cost, 1.0),
                Node::Separator(s) => (s.cost, self.variables.value(s.remove_capacity)),
                Node::Booster(b) => (b.cost, self.variables.value(b.capacity)),
                Node::EndPipe(_) | Node::MidPipe(_) => (None, 0.0),
            };
            let Some(cost) = cost else { continue };
            let index = node
                .install_time()
                .and_then(|v| self.variables.get(v))
                .map_or(0, |v| v.as_index());
            // installation scheduled past the horizon never happens
            let Some(time) = self.schedule.time(index) else { continue };
            events.push(CostEvent {
                time,
                amount: cost.amount(capacity),
                source: node.label().to_string(),
            });
        }
        events
    }

    /// Compute basic statistics about the network
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();
        for node in self.graph.node_weights() {
            match node {
                Node::Well(w) if w.is_production() => stats.production_wells += 1,
                Node::Well(_) => stats.injection_wells += 1,
                Node::EndPipe(_) => stats.end_pipes += 1,
                Node::MidPipe(_) => stats.mid_pipes += 1,
                Node::Separator(_) => stats.separators += 1,
                Node::Booster(_) => stats.boosters += 1,
            }
        }
        stats.connections = self.graph.edge_count();
        stats.capacities = self.capacities.len();
        stats.variables = self.variables.len();
        stats.free_variables = self.variables.iter().filter(|v| v.is_variable()).count();
        stats
    }

    /// Validate the topology for problems that would abort an evaluation.
    ///
    /// Populates the provided `Diagnostics` with any warnings/errors found.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        let stats = self.stats();
        if stats.production_wells == 0 {
            diag.add_error("structure", "Network has no production wells");
        }
        if stats.end_pipes == 0 && stats.production_wells > 0 {
            diag.add_error("structure", "Network has no terminal pipe");
        }

        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let outlets = self.outlets(idx).len();
            let name = node.label();
            match node {
                Node::Well(w) if w.is_production() && outlets == 0 => {
                    diag.add_warning_with_entity("topology", "Production well is not connected", name);
                }
                Node::Well(w) if !w.is_production() && outlets > 0 => {
                    diag.add_error_with_entity("topology", "Injection well cannot feed the network", name);
                }
                Node::EndPipe(_) if outlets > 0 => {
                    diag.add_error_with_entity("topology", "Terminal pipe has outlet connections", name);
                }
                Node::MidPipe(_) if outlets == 0 => {
                    diag.add_error_with_entity("topology", "Pipe has no outlet connection", name);
                }
                Node::Separator(_) | Node::Booster(_) if outlets != 1 => {
                    diag.add_error_with_entity(
                        "topology",
                        &format!("Expected exactly one outlet connection, found {outlets}"),
                        name,
                    );
                }
                _ => {}
            }
            for (_, var) in self.outlets(idx) {
                match self.variables.get(var) {
                    Some(v) if v.min < 0.0 || v.max > 1.0 => diag.add_error_with_entity(
                        "routing",
                        &format!("Routing variable '{}' has bounds outside [0, 1]", v.name),
                        name,
                    ),
                    None => diag.add_error_with_entity(
                        "routing",
                        &format!("Routing variable {var} is not registered"),
                        name,
                    ),
                    _ => {}
                }
            }
        }

        if let Err(err) = crate::graph_utils::topological_order(self) {
            diag.add_error("topology", &err.to_string());
        }

        for capacity in &self.capacities {
            if capacity.feeds.is_empty() {
                diag.add_warning_with_entity("capacity", "Capacity has no feed pipes", &capacity.name);
            }
        }
        for uc in &self.user_constraints {
            for term in &uc.terms {
                if self.find(&term.component).is_none() {
                    diag.add_error_with_entity(
                        "constraint",
                        &format!("Unknown component '{}'", term.component),
                        &uc.name,
                    );
                }
            }
            if uc.time_index >= self.schedule.len() && !self.schedule.is_empty() {
                diag.add_error_with_entity("constraint", "Time index outside the schedule", &uc.name);
            }
        }
    }

    /// Rate of `phase` (or liquid when `None`) through `idx` at `index`.
    pub fn rate(&self, idx: NodeIndex, index: usize, phase: Option<Phase>) -> f64 {
        self.graph[idx]
            .streams()
            .get(index)
            .map_or(0.0, |s| match phase {
                Some(p) => s.rate(p),
                None => s.liquid_rate(),
            })
    }
}

/// Statistics about a network's size
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkStats {
    pub production_wells: usize,
    pub injection_wells: usize,
    pub end_pipes: usize,
    pub mid_pipes: usize,
    pub separators: usize,
    pub boosters: usize,
    pub connections: usize,
    pub capacities: usize,
    pub variables: usize,
    pub free_variables: usize,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} wells ({} injectors), {} pipes, {} separators, {} boosters, {} connections, {}/{} free variables",
            self.production_wells + self.injection_wells,
            self.injection_wells,
            self.end_pipes + self.mid_pipes,
            self.separators,
            self.boosters,
            self.connections,
            self.free_variables,
            self.variables
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{EndPipe, InstallCost, MidPipe, PressureBooster, Well};
    use crate::variables::VariableKind;

    fn chain() -> (Network, NodeIndex, NodeIndex, NodeIndex) {
        let mut net = Network::new(UnitSystem::Metric);
        let well = net.add_node(Node::Well(Well::production("P1")));
        let mid = net.add_node(Node::MidPipe(MidPipe::new("manifold")));
        let end = net.add_node(Node::EndPipe(EndPipe::new("export", 50.0, UnitSystem::Metric)));
        net.connect_fixed(well, mid, 1.0);
        net.connect_fixed(mid, end, 1.0);
        net.initialize(Schedule::new(vec![10.0, 20.0]).unwrap()).unwrap();
        (net, well, mid, end)
    }

    #[test]
    fn test_network_validation_ok() {
        let (net, ..) = chain();
        let mut diag = Diagnostics::new();
        net.validate_into(&mut diag);
        assert!(!diag.has_errors(), "{diag}");
    }

    #[test]
    fn test_network_validation_empty() {
        let net = Network::new(UnitSystem::Metric);
        let mut diag = Diagnostics::new();
        net.validate_into(&mut diag);
        assert!(diag.errors().any(|i| i.message.contains("no production wells")));
    }

    #[test]
    fn test_mid_pipe_without_outlet() {
        let mut net = Network::new(UnitSystem::Metric);
        let well = net.add_node(Node::Well(Well::production("P1")));
        let mid = net.add_node(Node::MidPipe(MidPipe::new("dead-end")));
        net.connect_fixed(well, mid, 1.0);
        let mut diag = Diagnostics::new();
        net.validate_into(&mut diag);
        assert!(diag
            .errors()
            .any(|i| i.entity.as_deref() == Some("dead-end")));
    }

    #[test]
    fn test_feeders_and_outlets() {
        let (net, well, mid, end) = chain();
        assert_eq!(net.outlets(well)[0].0, mid);
        assert_eq!(net.feeders(end)[0].0, mid);
        assert_eq!(net.find("export"), Some(end));
        assert!(net.require("nowhere").is_err());
    }

    #[test]
    fn test_set_well_streams_checks_length() {
        let (mut net, well, ..) = chain();
        let err = net
            .set_well_streams(well, vec![Stream::default()])
            .unwrap_err();
        assert!(matches!(err, FlowError::ScheduleMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn test_cost_event_at_install_time() {
        let (mut net, _, mid, _) = chain();
        let install = net.variables.add("install", VariableKind::Integer, 1.0, 0.0, 1.0);
        let dp = net.variables.add_fixed("dp", 5.0);
        let cap = net.variables.add_fixed("cap", 100.0);
        let booster = net.add_node(Node::Booster(
            PressureBooster::new("pump", dp, cap)
                .with_install_time(install)
                .with_cost(InstallCost {
                    constant: 1.0,
                    capacity_factor: 0.5,
                    exponent: 1.0,
                }),
        ));
        net.connect_fixed(booster, mid, 1.0);
        let events = net.cost_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, 20.0);
        assert_eq!(events[0].amount, 51.0);
        assert_eq!(net.variables.get(dp).unwrap().owner, Some(booster));
    }

    #[test]
    fn test_stats() {
        let (net, ..) = chain();
        let stats = net.stats();
        assert_eq!(stats.production_wells, 1);
        assert_eq!(stats.mid_pipes, 1);
        assert_eq!(stats.end_pipes, 1);
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.free_variables, 0);
    }
}
